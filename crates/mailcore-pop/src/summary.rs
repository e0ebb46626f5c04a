//! POP-specific alias of the component G folder summary.
//!
//! POP has no UIDVALIDITY-equivalent header field — a maildrop doesn't
//! version itself the way an IMAP mailbox does — so there's no header
//! extension to add; the generic `()` [`HeaderExtra`](mailcore::summary::HeaderExtra)
//! is used directly.

use mailcore::{MessageInfo, Summary};

/// A maildrop's durable message index.
pub type FolderSummary = Summary<MessageInfo, ()>;
