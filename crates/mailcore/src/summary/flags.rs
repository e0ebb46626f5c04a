//! Message flags and the three-way flag merge (spec.md §3, §4.G, §8).

/// A bitmask of system flags, extension flags, and the local `DIRTY` bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags(pub u32);

impl Flags {
    // System flags (IMAP `\Flag` / POP n/a).
    /// `\Answered`
    pub const ANSWERED: Flags = Flags(1 << 0);
    /// `\Deleted`
    pub const DELETED: Flags = Flags(1 << 1);
    /// `\Draft`
    pub const DRAFT: Flags = Flags(1 << 2);
    /// `\Flagged`
    pub const FLAGGED: Flags = Flags(1 << 3);
    /// `\Recent`
    pub const RECENT: Flags = Flags(1 << 4);
    /// `\Seen`
    pub const SEEN: Flags = Flags(1 << 5);

    // Extension flags, local bookkeeping only (not wire flags).
    /// Message has been forwarded.
    pub const FORWARDED: Flags = Flags(1 << 6);
    /// Message has a multipart body.
    pub const MULTIPART: Flags = Flags(1 << 7);
    /// Message is cryptographically signed.
    pub const SIGNED: Flags = Flags(1 << 8);
    /// Message is encrypted.
    pub const ENCRYPTED: Flags = Flags(1 << 9);
    /// Message is marked junk.
    pub const JUNK: Flags = Flags(1 << 10);
    /// Message is marked not-junk.
    pub const NOTJUNK: Flags = Flags(1 << 11);

    /// A local flag change is pending sync to the server.
    pub const DIRTY: Flags = Flags(1 << 31);

    /// Mask of every bit the server can be told about (system flags only).
    pub const SYSTEM_MASK: Flags = Flags(
        Self::ANSWERED.0 | Self::DELETED.0 | Self::DRAFT.0 | Self::FLAGGED.0 | Self::RECENT.0 | Self::SEEN.0,
    );

    /// Bitwise-or.
    #[must_use]
    pub fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    /// Bitwise-and.
    #[must_use]
    pub fn intersection(self, other: Flags) -> Flags {
        Flags(self.0 & other.0)
    }

    /// Bitwise-xor.
    #[must_use]
    pub fn difference(self, other: Flags) -> Flags {
        Flags(self.0 ^ other.0)
    }

    /// Bitwise-not.
    #[must_use]
    pub fn complement(self) -> Flags {
        Flags(!self.0)
    }

    /// True if every bit in `other` is set.
    #[must_use]
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `self` with `other`'s bits set or cleared.
    #[must_use]
    pub fn with(self, other: Flags, value: bool) -> Flags {
        if value {
            self.union(other)
        } else {
            Flags(self.0 & !other.0)
        }
    }
}

/// Three-way merge of server and local flag state, per spec.md §4.G:
///
/// ```text
/// diff   = original_server XOR local_current   ("changed locally")
/// merged = (new_server AND NOT diff) OR (local_current AND diff)
/// ```
///
/// Satisfies (spec.md §8):
/// - `merge(o, merge(o, l, s), s) == merge(o, l, s)` (idempotent w.r.t.
///   re-pulling the same server state)
/// - `merge(o, l, o) == l` (no-op if the server state matches `original`)
#[must_use]
pub fn merge_flags(original_server: Flags, local_current: Flags, new_server: Flags) -> Flags {
    let diff = original_server.difference(local_current);
    new_server
        .intersection(diff.complement())
        .union(local_current.intersection(diff))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn flags_strategy() -> impl Strategy<Value = Flags> {
        (0u32..=0xFFF).prop_map(Flags)
    }

    proptest! {
        #[test]
        fn merge_is_idempotent_on_repeated_server_state(
            o in flags_strategy(), l in flags_strategy(), s in flags_strategy()
        ) {
            let once = merge_flags(o, l, s);
            let twice = merge_flags(o, once, s);
            prop_assert_eq!(once.0, twice.0);
        }

        #[test]
        fn merge_is_noop_when_server_unchanged(o in flags_strategy(), l in flags_strategy()) {
            let merged = merge_flags(o, l, o);
            prop_assert_eq!(merged.0, l.0);
        }
    }

    #[test]
    fn merge_keeps_local_additions_and_server_additions() {
        let original = Flags::default();
        let local = Flags::SEEN; // user marked seen locally
        let server = Flags::ANSWERED; // someone else answered from another client
        let merged = merge_flags(original, local, server);
        assert!(merged.contains(Flags::SEEN));
        assert!(merged.contains(Flags::ANSWERED));
    }

    #[test]
    fn merge_keeps_local_removal_over_server_reappearance() {
        let original = Flags::SEEN;
        let local = Flags::default(); // user marked unseen locally
        let server = Flags::SEEN; // server still reports seen (stale)
        let merged = merge_flags(original, local, server);
        assert!(!merged.contains(Flags::SEEN));
    }
}
