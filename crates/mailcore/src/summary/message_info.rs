//! Message envelope record, per spec.md §3 ("Message info") and the
//! on-disk layout in §4.G.

use std::io;

use super::codec::{Reader, write_string, write_u32, write_u64};
use super::flags::Flags;

/// A 128-bit content hash of a `Message-ID` header (or a References entry).
///
/// spec.md §3 calls this a "64-bit hash" but the on-disk layout in §4.G
/// gives each one a `.hi`/`.lo` pair — the original `GMime` hash is 128
/// bits split into two `u64` halves. The wider, on-disk-layout-authoritative
/// shape is used here; see DESIGN.md for the resolved ambiguity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MessageId {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

/// An ordered set of user-defined flag names (e.g. `$Label1`).
pub type UserFlags = Vec<String>;
/// An ordered map of user-defined tag name/value pairs.
pub type UserTags = Vec<(String, String)>;

/// Envelope and bookkeeping fields for one message, independent of provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageInfo {
    /// Provider-assigned unique id (IMAP: decimal UID string; POP: UIDL or
    /// synthesised `"<seqid>:<octets>"`).
    pub uid: String,
    /// `Sender` header.
    pub sender: String,
    /// `From` header.
    pub from: String,
    /// `Reply-To` header.
    pub reply_to: String,
    /// `To` header.
    pub to: String,
    /// `Cc` header.
    pub cc: String,
    /// `Bcc` header.
    pub bcc: String,
    /// `Subject` header.
    pub subject: String,
    /// `Date` header, as seconds since the epoch.
    pub date_sent: u32,
    /// Time the message was received by this client, seconds since epoch.
    pub date_received: u32,
    /// Hash of the `Message-ID` header.
    pub message_id: MessageId,
    /// Hashes of each entry in the `References` header, in order.
    pub references: Vec<MessageId>,
    /// System + extension + DIRTY flag bits.
    pub flags: Flags,
    /// Message size in octets.
    pub size: u32,
    /// Message size in lines (POP: from the server's UIDL/LIST count or 0
    /// when unknown; IMAP: `RFC822.SIZE`-adjacent but independently tracked).
    pub lines: u32,
    /// User-defined flag labels, insertion order preserved.
    pub user_flags: UserFlags,
    /// User-defined tag name/value pairs, insertion order preserved.
    pub user_tags: UserTags,
}

impl MessageInfo {
    /// Appends this record's on-disk encoding to `out` (spec.md §4.G).
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_string(out, &self.sender);
        write_string(out, &self.from);
        write_string(out, &self.reply_to);
        write_string(out, &self.to);
        write_string(out, &self.cc);
        write_string(out, &self.bcc);
        write_string(out, &self.subject);
        write_u32(out, self.date_sent);
        write_u32(out, self.date_received);
        write_string(out, &self.uid);
        write_u64(out, self.message_id.hi);
        write_u64(out, self.message_id.lo);
        write_u32(out, self.references.len() as u32);
        for r in &self.references {
            write_u64(out, r.hi);
            write_u64(out, r.lo);
        }
        write_u32(out, self.flags.0);
        write_u32(out, self.size);
        write_u32(out, self.lines);
        write_u32(out, self.user_flags.len() as u32);
        for f in &self.user_flags {
            write_string(out, f);
        }
        write_u32(out, self.user_tags.len() as u32);
        for (k, v) in &self.user_tags {
            write_string(out, k);
            write_string(out, v);
        }
    }

    /// Decodes a record written by [`MessageInfo::encode`].
    ///
    /// Any short read aborts the *whole load* per spec.md §6 ("tolerates
    /// truncation") — callers of the summary loader, not this function,
    /// are responsible for discarding partially-read state and triggering
    /// a full re-fetch.
    pub fn decode(r: &mut Reader<'_>) -> io::Result<MessageInfo> {
        let sender = r.read_string()?;
        let from = r.read_string()?;
        let reply_to = r.read_string()?;
        let to = r.read_string()?;
        let cc = r.read_string()?;
        let bcc = r.read_string()?;
        let subject = r.read_string()?;
        let date_sent = r.read_u32()?;
        let date_received = r.read_u32()?;
        let uid = r.read_string()?;
        let message_id = MessageId {
            hi: r.read_u64()?,
            lo: r.read_u64()?,
        };
        let refcount = r.read_u32()? as usize;
        let mut references = Vec::with_capacity(refcount);
        for _ in 0..refcount {
            references.push(MessageId {
                hi: r.read_u64()?,
                lo: r.read_u64()?,
            });
        }
        let flags = Flags(r.read_u32()?);
        let size = r.read_u32()?;
        let lines = r.read_u32()?;
        let n_userflags = r.read_u32()? as usize;
        let mut user_flags = Vec::with_capacity(n_userflags);
        for _ in 0..n_userflags {
            user_flags.push(r.read_string()?);
        }
        let n_usertags = r.read_u32()? as usize;
        let mut user_tags = Vec::with_capacity(n_usertags);
        for _ in 0..n_usertags {
            let k = r.read_string()?;
            let v = r.read_string()?;
            user_tags.push((k, v));
        }
        Ok(MessageInfo {
            uid,
            sender,
            from,
            reply_to,
            to,
            cc,
            bcc,
            subject,
            date_sent,
            date_received,
            message_id,
            references,
            flags,
            size,
            lines,
            user_flags,
            user_tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::codec::Reader;

    fn sample(uid: &str) -> MessageInfo {
        MessageInfo {
            uid: uid.to_string(),
            sender: "sender@example.com".into(),
            from: "From Person <from@example.com>".into(),
            reply_to: String::new(),
            to: "to@example.com".into(),
            cc: String::new(),
            bcc: String::new(),
            subject: "Hi — \u{1F600}".into(),
            date_sent: 1_700_000_000,
            date_received: 1_700_000_005,
            message_id: MessageId { hi: 1, lo: 2 },
            references: vec![MessageId { hi: 3, lo: 4 }, MessageId { hi: 5, lo: 6 }],
            flags: Flags::SEEN.union(Flags::FLAGGED),
            size: 4096,
            lines: 88,
            user_flags: vec!["$Label1".into(), "Important".into()],
            user_tags: vec![("color".into(), "red".into())],
        }
    }

    #[test]
    fn round_trips_every_field() {
        let info = sample("101");
        let mut buf = Vec::new();
        info.encode(&mut buf);
        let mut r = Reader::new(&buf);
        let decoded = MessageInfo::decode(&mut r).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn truncated_buffer_errors_instead_of_panicking() {
        let info = sample("102");
        let mut buf = Vec::new();
        info.encode(&mut buf);
        buf.truncate(buf.len() - 3);
        let mut r = Reader::new(&buf);
        assert!(MessageInfo::decode(&mut r).is_err());
    }
}
