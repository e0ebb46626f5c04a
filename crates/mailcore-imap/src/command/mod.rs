//! Component D: IMAP command builder.
//!
//! Grounded in `spruce-imap-command.c`'s format-directive command
//! builder: rather than a printf-style template string, each [`Command`]
//! variant already carries typed arguments (spec.md §9's suggested
//! redesign), and [`Command::parts`] expands them into a [`Part`] list
//! split wherever an argument can't be represented as a quoted string
//! (because it contains bytes a quoted-string can't hold, or because the
//! caller wants literals for everything a given server quirk requires).
//! The caller is responsible for the continuation-response dance: send
//! every [`Part::Text`] immediately, but pause after a non-`LITERAL+`
//! [`Part::Literal`] until a `+` continuation arrives.

mod serialize;
mod tag_generator;
mod types;

use crate::types::{Flag, Mailbox, SequenceSet};

pub use tag_generator::TagGenerator;
pub use types::{FetchAttribute, FetchItems, SearchCriteria, StatusAttribute, StoreAction};

use serialize::{write_fetch_items, write_mailbox, write_search_criteria, write_store_action};

/// One piece of a command's wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Plain bytes, safe to send immediately.
    Text(Vec<u8>),
    /// A literal body. Unless `sync` is false (`LITERAL+`, announced as
    /// `{n+}`), the caller must wait for a `+` continuation response
    /// before writing these bytes.
    Literal {
        /// The raw literal bytes.
        data: Vec<u8>,
        /// `false` when rendered as `{n+}` (no continuation needed).
        sync: bool,
    },
}

/// An ordered command encoding, tag included in the first part.
pub type PartList = Vec<Part>;

/// Accumulates [`Part`]s, merging adjacent text instead of fragmenting
/// on every call.
#[derive(Default)]
struct Builder {
    parts: PartList,
    text: Vec<u8>,
}

impl Builder {
    fn text(&mut self, bytes: &[u8]) {
        self.text.extend_from_slice(bytes);
    }

    fn astring(&mut self, s: &str, literal_plus: bool) {
        if needs_literal(s) {
            self.flush();
            let n = s.len();
            if literal_plus {
                self.text(format!("{{{n}+}}\r\n").as_bytes());
                self.parts.push(Part::Literal {
                    data: s.as_bytes().to_vec(),
                    sync: false,
                });
                self.flush_literal_marker();
            } else {
                self.text(format!("{{{n}}}\r\n").as_bytes());
                self.flush();
                self.parts.push(Part::Literal {
                    data: s.as_bytes().to_vec(),
                    sync: true,
                });
            }
        } else {
            serialize::write_astring(&mut self.text, s);
        }
    }

    /// LITERAL+ bodies are self-delimited (no continuation wait), so the
    /// text-merge buffer can keep accumulating right after them.
    fn flush_literal_marker(&mut self) {
        // Nothing further required: the {n+}\r\n marker was already
        // written to `self.text` before the literal part was pushed, and
        // since LITERAL+ needs no continuation the next astring/text call
        // can append straight after it once flush() runs at call end.
    }

    fn flush(&mut self) {
        if !self.text.is_empty() {
            self.parts.push(Part::Text(std::mem::take(&mut self.text)));
        }
    }

    fn finish(mut self) -> PartList {
        self.flush();
        self.parts
    }
}

/// A quoted-string cannot hold CR, LF, or NUL; such content (a free-text
/// search term pasted from a message body, an attacker-controlled
/// mailbox name) must be sent as a literal instead.
fn needs_literal(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0)
}

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Any State Commands
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,

    // Not Authenticated State Commands
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE command.
    Authenticate {
        /// Authentication mechanism.
        mechanism: String,
        /// Initial response (optional).
        initial_response: Option<String>,
    },

    // Authenticated State Commands
    /// ID command (RFC 2971) - client/server identification.
    Id {
        /// Client identification parameters (field-value pairs).
        /// None = ID NIL (no identification).
        parameters: Option<Vec<(String, String)>>,
    },
    /// ENABLE command.
    Enable {
        /// Capabilities to enable.
        capabilities: Vec<String>,
    },
    /// SELECT command.
    Select {
        /// Mailbox to select.
        mailbox: Mailbox,
        /// Enable CONDSTORE.
        condstore: bool,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox to examine.
        mailbox: Mailbox,
    },
    /// CREATE command.
    Create {
        /// Mailbox to create.
        mailbox: Mailbox,
    },
    /// DELETE command.
    Delete {
        /// Mailbox to delete.
        mailbox: Mailbox,
    },
    /// RENAME command.
    Rename {
        /// Current mailbox name.
        from: Mailbox,
        /// New mailbox name.
        to: Mailbox,
    },
    /// SUBSCRIBE command.
    Subscribe {
        /// Mailbox to subscribe.
        mailbox: Mailbox,
    },
    /// UNSUBSCRIBE command.
    Unsubscribe {
        /// Mailbox to unsubscribe.
        mailbox: Mailbox,
    },
    /// LIST command.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// LSUB command (subscribed mailboxes only).
    Lsub {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// NAMESPACE command (RFC 2342).
    Namespace,
    /// STATUS command.
    Status {
        /// Mailbox name.
        mailbox: Mailbox,
        /// Status items to request.
        items: Vec<StatusAttribute>,
    },
    /// APPEND command. The message body is always sent as a literal.
    Append {
        /// Target mailbox.
        mailbox: Mailbox,
        /// Flags to set.
        flags: Option<Vec<Flag>>,
        /// Message data.
        message: Vec<u8>,
    },

    // Selected State Commands
    /// CLOSE command.
    Close,
    /// UNSELECT command (RFC 3691).
    Unselect,
    /// EXPUNGE command.
    Expunge,
    /// UID EXPUNGE command (RFC 4315 UIDPLUS) - expunge specific UIDs.
    UidExpunge {
        /// UIDs to expunge.
        uids: SequenceSet,
    },
    /// SEARCH command.
    Search {
        /// Search criteria.
        criteria: SearchCriteria,
        /// Use UIDs.
        uid: bool,
    },
    /// FETCH command.
    Fetch {
        /// Sequence set.
        sequence: SequenceSet,
        /// Items to fetch.
        items: FetchItems,
        /// Use UIDs.
        uid: bool,
    },
    /// STORE command.
    Store {
        /// Sequence set.
        sequence: SequenceSet,
        /// Store action.
        action: StoreAction,
        /// Use UIDs.
        uid: bool,
        /// Silent mode (no FETCH response).
        silent: bool,
    },
    /// COPY command.
    Copy {
        /// Sequence set.
        sequence: SequenceSet,
        /// Target mailbox.
        mailbox: Mailbox,
        /// Use UIDs.
        uid: bool,
    },
    /// MOVE command (RFC 6851).
    Move {
        /// Sequence set.
        sequence: SequenceSet,
        /// Target mailbox.
        mailbox: Mailbox,
        /// Use UIDs.
        uid: bool,
    },
    /// IDLE command (parsed responses only; the library does not loop
    /// inside IDLE — see spec Non-goals).
    Idle,
    /// DONE (to end IDLE).
    Done,
    /// A pre-rendered command line, sent verbatim after the tag. Used for
    /// capability-gated extensions this client doesn't model as dedicated
    /// variants, e.g. GroupWise's `XGWEXTENSIONS` and `UID XGWMOVE`.
    Raw(String),
}

impl Command {
    /// Renders this command into a tagged [`PartList`], splitting at
    /// literal boundaries. `literal_plus` controls whether literal-eligible
    /// content is announced as `{n}` (needs a `+` continuation) or `{n+}`
    /// (`LITERAL+`, sent immediately) — the caller passes the capability
    /// bit negotiated at connect time.
    #[must_use]
    pub fn parts(&self, tag: &str, literal_plus: bool) -> PartList {
        let mut b = Builder::default();

        if !matches!(self, Self::Done) {
            b.text(tag.as_bytes());
            b.text(b" ");
        }

        match self {
            Self::Capability => b.text(b"CAPABILITY"),
            Self::Noop => b.text(b"NOOP"),
            Self::Logout => b.text(b"LOGOUT"),
            Self::StartTls => b.text(b"STARTTLS"),

            Self::Login { username, password } => {
                b.text(b"LOGIN ");
                b.astring(username, literal_plus);
                b.text(b" ");
                b.astring(password, literal_plus);
            }

            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                b.text(b"AUTHENTICATE ");
                b.text(mechanism.as_bytes());
                if let Some(resp) = initial_response {
                    b.text(b" ");
                    b.text(resp.as_bytes());
                }
            }

            Self::Id { parameters } => {
                b.text(b"ID ");
                if let Some(params) = parameters {
                    b.text(b"(");
                    for (i, (key, value)) in params.iter().enumerate() {
                        if i > 0 {
                            b.text(b" ");
                        }
                        b.astring(key, literal_plus);
                        b.text(b" ");
                        b.astring(value, literal_plus);
                    }
                    b.text(b")");
                } else {
                    b.text(b"NIL");
                }
            }

            Self::Enable { capabilities } => {
                b.text(b"ENABLE");
                for cap in capabilities {
                    b.text(b" ");
                    b.text(cap.as_bytes());
                }
            }

            Self::Select { mailbox, condstore } => {
                b.text(b"SELECT ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, mailbox);
                b.text(&buf);
                if *condstore {
                    b.text(b" (CONDSTORE)");
                }
            }

            Self::Examine { mailbox } => {
                b.text(b"EXAMINE ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, mailbox);
                b.text(&buf);
            }

            Self::Create { mailbox } => {
                b.text(b"CREATE ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, mailbox);
                b.text(&buf);
            }

            Self::Delete { mailbox } => {
                b.text(b"DELETE ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, mailbox);
                b.text(&buf);
            }

            Self::Rename { from, to } => {
                b.text(b"RENAME ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, from);
                b.text(&buf);
                b.text(b" ");
                buf.clear();
                write_mailbox(&mut buf, to);
                b.text(&buf);
            }

            Self::Subscribe { mailbox } => {
                b.text(b"SUBSCRIBE ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, mailbox);
                b.text(&buf);
            }

            Self::Unsubscribe { mailbox } => {
                b.text(b"UNSUBSCRIBE ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, mailbox);
                b.text(&buf);
            }

            Self::List { reference, pattern } => {
                b.text(b"LIST ");
                b.astring(reference, literal_plus);
                b.text(b" ");
                b.astring(pattern, literal_plus);
            }

            Self::Lsub { reference, pattern } => {
                b.text(b"LSUB ");
                b.astring(reference, literal_plus);
                b.text(b" ");
                b.astring(pattern, literal_plus);
            }

            Self::Namespace => b.text(b"NAMESPACE"),

            Self::Status { mailbox, items } => {
                b.text(b"STATUS ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, mailbox);
                b.text(&buf);
                b.text(b" (");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        b.text(b" ");
                    }
                    b.text(item.as_str().as_bytes());
                }
                b.text(b")");
            }

            Self::Append {
                mailbox,
                flags,
                message,
            } => {
                b.text(b"APPEND ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, mailbox);
                b.text(&buf);
                if let Some(flags) = flags {
                    b.text(b" (");
                    for (i, flag) in flags.iter().enumerate() {
                        if i > 0 {
                            b.text(b" ");
                        }
                        b.text(flag.as_str().as_bytes());
                    }
                    b.text(b")");
                }
                b.text(b" ");
                b.flush();
                let n = message.len();
                if literal_plus {
                    b.text(format!("{{{n}+}}\r\n").as_bytes());
                    b.flush();
                    b.parts.push(Part::Literal {
                        data: message.clone(),
                        sync: false,
                    });
                } else {
                    b.text(format!("{{{n}}}\r\n").as_bytes());
                    b.flush();
                    b.parts.push(Part::Literal {
                        data: message.clone(),
                        sync: true,
                    });
                }
            }

            Self::Close => b.text(b"CLOSE"),
            Self::Unselect => b.text(b"UNSELECT"),
            Self::Expunge => b.text(b"EXPUNGE"),

            Self::UidExpunge { uids } => {
                b.text(b"UID EXPUNGE ");
                b.text(uids.to_string().as_bytes());
            }

            Self::Search { criteria, uid } => {
                if *uid {
                    b.text(b"UID ");
                }
                b.text(b"SEARCH ");
                let mut buf = Vec::new();
                write_search_criteria(&mut buf, criteria);
                b.text(&buf);
            }

            Self::Fetch {
                sequence,
                items,
                uid,
            } => {
                if *uid {
                    b.text(b"UID ");
                }
                b.text(b"FETCH ");
                b.text(sequence.to_string().as_bytes());
                b.text(b" ");
                let mut buf = Vec::new();
                write_fetch_items(&mut buf, items);
                b.text(&buf);
            }

            Self::Store {
                sequence,
                action,
                uid,
                silent,
            } => {
                if *uid {
                    b.text(b"UID ");
                }
                b.text(b"STORE ");
                b.text(sequence.to_string().as_bytes());
                b.text(b" ");
                let mut buf = Vec::new();
                write_store_action(&mut buf, action, *silent);
                b.text(&buf);
            }

            Self::Copy {
                sequence,
                mailbox,
                uid,
            } => {
                if *uid {
                    b.text(b"UID ");
                }
                b.text(b"COPY ");
                b.text(sequence.to_string().as_bytes());
                b.text(b" ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, mailbox);
                b.text(&buf);
            }

            Self::Move {
                sequence,
                mailbox,
                uid,
            } => {
                if *uid {
                    b.text(b"UID ");
                }
                b.text(b"MOVE ");
                b.text(sequence.to_string().as_bytes());
                b.text(b" ");
                let mut buf = Vec::new();
                write_mailbox(&mut buf, mailbox);
                b.text(&buf);
            }

            Self::Idle => b.text(b"IDLE"),
            Self::Done => b.text(b"DONE"),
            Self::Raw(line) => b.text(line.as_bytes()),
        }

        b.text(b"\r\n");
        b.finish()
    }

    /// Convenience for the common case: no literal content, so the whole
    /// command is a single buffer.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for part in self.parts(tag, false) {
            match part {
                Part::Text(t) => out.extend_from_slice(&t),
                Part::Literal { data, .. } => out.extend_from_slice(&data),
            }
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::types::Flag;

    use super::*;

    #[test]
    fn capability_command() {
        let cmd = Command::Capability;
        assert_eq!(cmd.serialize("A0000"), b"A0000 CAPABILITY\r\n");
    }

    #[test]
    fn login_plain() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        assert_eq!(cmd.serialize("A0000"), b"A0000 LOGIN user pass\r\n");
    }

    #[test]
    fn login_needs_quoting() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "pass word".to_string(),
        };
        assert_eq!(
            cmd.serialize("A0000"),
            b"A0000 LOGIN user@example.com \"pass word\"\r\n"
        );
    }

    #[test]
    fn login_with_embedded_newline_splits_into_a_literal() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "emb\nedded".to_string(),
        };
        let parts = cmd.parts("A0000", false);
        assert!(parts.len() >= 2, "expected the password to split off into its own part");
        assert!(matches!(parts.last(), Some(Part::Text(t)) if t.ends_with(b"\r\n")));
        let has_literal = parts.iter().any(|p| matches!(p, Part::Literal { sync: true, .. }));
        assert!(has_literal);
    }

    #[test]
    fn login_literal_plus_marks_non_sync() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "emb\nedded".to_string(),
        };
        let parts = cmd.parts("A0000", true);
        assert!(parts.iter().any(|p| matches!(p, Part::Literal { sync: false, .. })));
    }

    #[test]
    fn select_command() {
        let cmd = Command::Select {
            mailbox: Mailbox::inbox(),
            condstore: false,
        };
        assert_eq!(cmd.serialize("A0000"), b"A0000 SELECT INBOX\r\n");
    }

    #[test]
    fn fetch_command() {
        let cmd = Command::Fetch {
            sequence: SequenceSet::range(1, 10).unwrap(),
            items: FetchItems::Items(vec![FetchAttribute::Flags, FetchAttribute::Uid]),
            uid: false,
        };
        assert_eq!(cmd.serialize("A0000"), b"A0000 FETCH 1:10 (FLAGS UID)\r\n");
    }

    #[test]
    fn store_command() {
        let cmd = Command::Store {
            sequence: SequenceSet::single(1).unwrap(),
            action: StoreAction::AddFlags(vec![Flag::Seen]),
            uid: false,
            silent: true,
        };
        assert_eq!(
            cmd.serialize("A0000"),
            b"A0000 STORE 1 +FLAGS.SILENT (\\Seen)\r\n"
        );
    }

    #[test]
    fn uid_expunge_command() {
        let cmd = Command::UidExpunge {
            uids: SequenceSet::range(100, 200).unwrap(),
        };
        assert_eq!(cmd.serialize("A0000"), b"A0000 UID EXPUNGE 100:200\r\n");
    }

    #[test]
    fn append_always_uses_a_literal_for_the_body() {
        let cmd = Command::Append {
            mailbox: Mailbox::inbox(),
            flags: Some(vec![Flag::Seen]),
            message: b"Subject: hi\r\n\r\nbody".to_vec(),
        };
        let parts = cmd.parts("A0000", false);
        assert!(matches!(parts.last(), Some(Part::Literal { sync: true, .. })));
    }

    #[test]
    fn done_has_no_tag() {
        let cmd = Command::Done;
        assert_eq!(cmd.serialize(""), b"DONE\r\n");
    }
}
