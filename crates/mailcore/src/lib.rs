//! # mailcore
//!
//! Shared foundation for the `mailcore-imap` and `mailcore-pop` protocol
//! engines.
//!
//! This crate provides:
//! - The service URL grammar ([`url`])
//! - The error taxonomy both engines build on ([`error`])
//! - A cancellable byte-level I/O adapter ([`io`])
//! - The folder-summary cache: message records, on-disk binary format,
//!   flag three-way merge, and UID-set compaction ([`summary`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(unsafe_code)]

mod error;
pub mod io;
pub mod summary;
pub mod url;

pub use error::{Error, Result};
pub use summary::{Flags, Header, MessageId, MessageInfo, MessageRecord, Summary, merge_flags, uidset};
pub use url::Url;
