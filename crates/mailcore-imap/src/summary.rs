//! IMAP-specific extension of the component G folder summary: adds the
//! one field IMAP needs beyond the generic header, UIDVALIDITY, so a
//! cached summary can be recognised as stale the moment the server
//! reports a different value on SELECT.

use std::io;

use mailcore::summary::HeaderExtra;
use mailcore::summary::codec::{Reader, write_u32};
use mailcore::{MessageInfo, Summary};

/// IMAP-specific header fields stored alongside the generic summary header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImapExtra {
    /// UIDVALIDITY last observed from the server. `0` means "never selected".
    pub uid_validity: u32,
}

impl HeaderExtra for ImapExtra {
    fn encode(&self, out: &mut Vec<u8>) {
        write_u32(out, self.uid_validity);
    }

    fn decode(r: &mut Reader<'_>) -> io::Result<Self> {
        Ok(ImapExtra {
            uid_validity: r.read_u32()?,
        })
    }
}

/// A folder's durable message index, with the IMAP UIDVALIDITY extension.
pub type FolderSummary = Summary<MessageInfo, ImapExtra>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_validity_round_trips_through_encode_decode() {
        let mut s: FolderSummary = Summary::new("INBOX");
        s.extra.uid_validity = 123_456;
        let bytes = s.encode();
        let loaded: FolderSummary = Summary::decode("INBOX", &bytes).unwrap();
        assert_eq!(loaded.extra.uid_validity, 123_456);
    }
}
