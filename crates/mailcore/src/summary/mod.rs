//! Component G (generic half): on-disk folder summary, message records,
//! flag merge, and UID-set compaction.
//!
//! The IMAP and POP subclasses share everything here and each add their own
//! provider-specific fields by implementing [`MessageRecord`] /
//! [`HeaderExtra`] on a wrapper type, per spec.md §9's guidance to model
//! the class hierarchy as composition rather than inheritance.

pub mod codec;
pub mod flags;
pub mod message_info;
pub mod uidset;

use std::io;

pub use flags::{Flags, merge_flags};
pub use message_info::{MessageId, MessageInfo, UserFlags, UserTags};

use codec::{Reader, write_string, write_u32};

/// Bitmask flags on the summary header itself. Reserved for future use;
/// always `0` today.
pub const HEADER_FLAGS_NONE: u32 = 0;

/// The current on-disk format version. Bumping this invalidates every
/// existing summary file (spec.md §6: "Version bump invalidates the file").
pub const SUMMARY_VERSION: u32 = 1;

/// A message record storable in a [`Summary`].
pub trait MessageRecord: Sized {
    /// The message's provider-assigned UID string.
    fn uid(&self) -> &str;
    /// Current flag bits, used to maintain the header's unread/deleted
    /// counts without a second pass over the whole file.
    fn flags(&self) -> Flags;
    /// Appends this record's encoding to `out`.
    fn encode(&self, out: &mut Vec<u8>);
    /// Decodes one record. Must consume exactly what `encode` wrote.
    fn decode(r: &mut Reader<'_>) -> io::Result<Self>;
}

impl MessageRecord for MessageInfo {
    fn uid(&self) -> &str {
        &self.uid
    }
    fn flags(&self) -> Flags {
        self.flags
    }
    fn encode(&self, out: &mut Vec<u8>) {
        MessageInfo::encode(self, out);
    }
    fn decode(r: &mut Reader<'_>) -> io::Result<Self> {
        MessageInfo::decode(r)
    }
}

/// Provider-specific header fields appended after the generic header.
pub trait HeaderExtra: Sized + Default + Clone + PartialEq {
    /// Appends this extra's encoding to `out`.
    fn encode(&self, out: &mut Vec<u8>);
    /// Decodes the extra fields.
    fn decode(r: &mut Reader<'_>) -> io::Result<Self>;
}

impl HeaderExtra for () {
    fn encode(&self, _out: &mut Vec<u8>) {}
    fn decode(_r: &mut Reader<'_>) -> io::Result<Self> {
        Ok(())
    }
}

/// The generic summary header (spec.md §4.G, §3's "Summary is loaded
/// lazily: the header lives on disk and carries counts").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Format version; see [`SUMMARY_VERSION`].
    pub version: u32,
    /// Reserved flag bits.
    pub flags: u32,
    /// Next UID the provider is expected to assign (IMAP: `UIDNEXT`).
    pub nextuid: u32,
    /// Seconds since the epoch the summary was last saved.
    pub timestamp: u32,
    /// Total message count.
    pub count: u32,
    /// Count of messages without `\Seen`.
    pub unread: u32,
    /// Count of messages with `\Deleted`.
    pub deleted: u32,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            version: SUMMARY_VERSION,
            flags: HEADER_FLAGS_NONE,
            nextuid: 1,
            timestamp: 0,
            count: 0,
            unread: 0,
            deleted: 0,
        }
    }
}

impl Header {
    fn encode(&self, out: &mut Vec<u8>) {
        write_u32(out, self.version);
        write_u32(out, self.flags);
        write_u32(out, self.nextuid);
        write_u32(out, self.timestamp);
        write_u32(out, self.count);
        write_u32(out, self.unread);
        write_u32(out, self.deleted);
    }

    fn decode(r: &mut Reader<'_>) -> io::Result<Header> {
        Ok(Header {
            version: r.read_u32()?,
            flags: r.read_u32()?,
            nextuid: r.read_u32()?,
            timestamp: r.read_u32()?,
            count: r.read_u32()?,
            unread: r.read_u32()?,
            deleted: r.read_u32()?,
        })
    }
}

/// A folder's durable message index.
pub struct Summary<T: MessageRecord, E: HeaderExtra = ()> {
    /// Name of the backing file (diagnostic use only).
    pub filename: String,
    /// Generic header fields.
    pub header: Header,
    /// Provider-specific header fields (e.g. IMAP `uidvalidity`).
    pub extra: E,
    messages: Vec<T>,
    uid_index: std::collections::HashMap<String, usize>,
}

impl<T: MessageRecord, E: HeaderExtra> Summary<T, E> {
    /// Creates an empty summary.
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Summary {
            filename: filename.into(),
            header: Header::default(),
            extra: E::default(),
            messages: Vec::new(),
            uid_index: std::collections::HashMap::new(),
        }
    }

    /// All loaded messages, in summary order.
    #[must_use]
    pub fn messages(&self) -> &[T] {
        &self.messages
    }

    /// Looks up a message by UID.
    #[must_use]
    pub fn get_by_uid(&self, uid: &str) -> Option<&T> {
        self.uid_index.get(uid).map(|&i| &self.messages[i])
    }

    /// Index of a UID within [`Summary::messages`], if present.
    #[must_use]
    pub fn index_of(&self, uid: &str) -> Option<usize> {
        self.uid_index.get(uid).copied()
    }

    /// Mutable access to one record by index, for in-place flag updates.
    /// Callers that mutate flags through this must call
    /// [`Summary::refresh_counts`] afterwards; the UID itself must not
    /// change, or the UID index goes stale.
    pub fn message_mut(&mut self, index: usize) -> Option<&mut T> {
        self.messages.get_mut(index)
    }

    /// Appends a message, keeping the UID index and header counts in sync.
    pub fn push(&mut self, record: T) {
        self.uid_index.insert(record.uid().to_string(), self.messages.len());
        self.bump_counts_for(&record, 1);
        self.messages.push(record);
        self.header.count = self.messages.len() as u32;
    }

    /// Removes the message at `index`, keeping the UID index consistent.
    pub fn remove(&mut self, index: usize) -> T {
        let removed = self.messages.remove(index);
        self.uid_index.remove(removed.uid());
        for (_, v) in self.uid_index.iter_mut() {
            if *v > index {
                *v -= 1;
            }
        }
        self.bump_counts_for(&removed, -1);
        self.header.count = self.messages.len() as u32;
        removed
    }

    fn bump_counts_for(&mut self, record: &T, delta: i64) {
        let f = record.flags();
        if !f.contains(Flags::SEEN) {
            self.header.unread = (i64::from(self.header.unread) + delta).max(0) as u32;
        }
        if f.contains(Flags::DELETED) {
            self.header.deleted = (i64::from(self.header.deleted) + delta).max(0) as u32;
        }
    }

    /// Recomputes `unread`/`deleted` from scratch. Call this after bulk
    /// flag mutations that bypassed [`Summary::push`]/[`Summary::remove`]
    /// (spec.md §9's open question: "implementations should decide a
    /// single canonical refresh point" — here it is, called explicitly
    /// before every save).
    pub fn refresh_counts(&mut self) {
        self.header.count = self.messages.len() as u32;
        self.header.unread = self
            .messages
            .iter()
            .filter(|m| !m.flags().contains(Flags::SEEN))
            .count() as u32;
        self.header.deleted = self
            .messages
            .iter()
            .filter(|m| m.flags().contains(Flags::DELETED))
            .count() as u32;
    }

    /// Serialises header + extra + every message record.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.header.encode(&mut out);
        self.extra.encode(&mut out);
        for m in &self.messages {
            m.encode(&mut out);
        }
        out
    }

    /// Loads from a byte buffer. Any short read while decoding a
    /// message-info record aborts the load and returns the accumulated
    /// (valid-prefix) summary with the header rewritten to match the
    /// prefix actually read — the caller treats this the same as a full
    /// cache miss and re-fetches, per spec.md §6.
    pub fn decode(filename: impl Into<String>, buf: &[u8]) -> io::Result<Self> {
        let mut r = Reader::new(buf);
        let header = Header::decode(&mut r)?;
        if header.version != SUMMARY_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "summary version mismatch",
            ));
        }
        let extra = E::decode(&mut r)?;
        let mut messages = Vec::with_capacity(header.count as usize);
        let mut uid_index = std::collections::HashMap::new();
        for _ in 0..header.count {
            match T::decode(&mut r) {
                Ok(record) => {
                    uid_index.insert(record.uid().to_string(), messages.len());
                    messages.push(record);
                }
                Err(_) => break, // truncated: stop here, caller re-fetches the rest
            }
        }
        let mut summary = Summary {
            filename: filename.into(),
            header,
            extra,
            messages,
            uid_index,
        };
        summary.refresh_counts();
        Ok(summary)
    }
}

/// Writes `source` as a `len:u32` + bytes field — exposed for provider
/// crates building bespoke per-record extra encodings.
pub fn encode_string_field(out: &mut Vec<u8>, s: &str) {
    write_string(out, s);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(uid: &str, seen: bool) -> MessageInfo {
        MessageInfo {
            uid: uid.to_string(),
            flags: if seen { Flags::SEEN } else { Flags::default() },
            ..MessageInfo::default()
        }
    }

    #[test]
    fn round_trips_header_and_messages() {
        let mut s: Summary<MessageInfo> = Summary::new("INBOX");
        s.push(info("1", true));
        s.push(info("2", false));
        s.push(info("3", false));
        assert_eq!(s.header.count, 3);
        assert_eq!(s.header.unread, 2);

        let bytes = s.encode();
        let loaded: Summary<MessageInfo> = Summary::decode("INBOX", &bytes).unwrap();
        assert_eq!(loaded.messages().len(), 3);
        assert_eq!(loaded.header.unread, 2);
        assert_eq!(loaded.get_by_uid("2").unwrap().uid, "2");
    }

    #[test]
    fn truncated_file_loads_valid_prefix_only() {
        let mut s: Summary<MessageInfo> = Summary::new("INBOX");
        s.push(info("1", true));
        s.push(info("2", false));
        let mut bytes = s.encode();
        bytes.truncate(bytes.len() - 2); // cut into the last record
        let loaded: Summary<MessageInfo> = Summary::decode("INBOX", &bytes).unwrap();
        assert_eq!(loaded.messages().len(), 1);
    }

    #[test]
    fn remove_keeps_uid_index_consistent() {
        let mut s: Summary<MessageInfo> = Summary::new("INBOX");
        s.push(info("1", true));
        s.push(info("2", false));
        s.push(info("3", false));
        s.remove(0);
        assert_eq!(s.index_of("2"), Some(0));
        assert_eq!(s.index_of("3"), Some(1));
        assert_eq!(s.index_of("1"), None);
    }
}
