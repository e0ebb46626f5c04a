//! POP3 commands and the capability table parsed from `CAPA`.

/// One POP3 command. `render` produces the exact line sent (without the
/// trailing CRLF, which the engine appends).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `CAPA` — request the capability list.
    Capa,
    /// `USER <name>`.
    User(String),
    /// `PASS <password>`.
    Pass(String),
    /// `APOP <name> <digest>` — MD5(timestamp + password) hex digest.
    Apop {
        /// Username.
        user: String,
        /// Hex-encoded MD5 digest.
        digest: String,
    },
    /// `AUTH <mechanism> [initial-response]`. SASL mechanism negotiation
    /// itself (beyond issuing this one command and returning the
    /// continuation text) is out of scope; see spec's Non-goals.
    Auth {
        /// SASL mechanism name.
        mechanism: String,
        /// Optional base64 initial response.
        initial_response: Option<String>,
    },
    /// `STAT`.
    Stat,
    /// `LIST [msg]` — all messages, or a single message's size.
    List(Option<u32>),
    /// `UIDL [msg]` — all messages' UIDs, or a single message's UID.
    Uidl(Option<u32>),
    /// `RETR <msg>`.
    Retr(u32),
    /// `TOP <msg> <lines>`.
    Top(u32, u32),
    /// `DELE <msg>`.
    Dele(u32),
    /// `RSET`.
    Rset,
    /// `NOOP`.
    Noop,
    /// `QUIT`.
    Quit,
    /// `STLS`.
    Stls,
    /// A pre-rendered command line, sent verbatim (escape hatch for
    /// server-specific extensions not otherwise modelled).
    Raw(String),
}

impl Command {
    /// Renders the wire line (no trailing CRLF).
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Capa => "CAPA".to_string(),
            Self::User(name) => format!("USER {name}"),
            Self::Pass(password) => format!("PASS {password}"),
            Self::Apop { user, digest } => format!("APOP {user} {digest}"),
            Self::Auth { mechanism, initial_response } => match initial_response {
                Some(resp) => format!("AUTH {mechanism} {resp}"),
                None => format!("AUTH {mechanism}"),
            },
            Self::Stat => "STAT".to_string(),
            Self::List(Some(n)) => format!("LIST {n}"),
            Self::List(None) => "LIST".to_string(),
            Self::Uidl(Some(n)) => format!("UIDL {n}"),
            Self::Uidl(None) => "UIDL".to_string(),
            Self::Retr(n) => format!("RETR {n}"),
            Self::Top(n, lines) => format!("TOP {n} {lines}"),
            Self::Dele(n) => format!("DELE {n}"),
            Self::Rset => "RSET".to_string(),
            Self::Noop => "NOOP".to_string(),
            Self::Quit => "QUIT".to_string(),
            Self::Stls => "STLS".to_string(),
            Self::Raw(line) => line.clone(),
        }
    }

    /// True if a positive `+OK` response to this command is followed by a
    /// multi-line block terminated by component C's EOD detection.
    #[must_use]
    pub const fn is_multiline(&self) -> bool {
        matches!(
            self,
            Self::Capa | Self::List(None) | Self::Uidl(None) | Self::Retr(_) | Self::Top(..)
        )
    }

    /// True for `RETR`/`TOP`, whose multi-line body is a raw byte stream
    /// rather than textual listing lines.
    #[must_use]
    pub const fn is_raw_body(&self) -> bool {
        matches!(self, Self::Retr(_) | Self::Top(..))
    }
}

/// A capability bit parsed from a `CAPA` response line, per spec.md §4.F's
/// table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// `LOGIN-DELAY <seconds>`.
    LoginDelay(u32),
    /// `PIPELINING`.
    Pipelining,
    /// `RESP-CODES`.
    RespCodes,
    /// `SASL <mech> <mech> ...`.
    Sasl(Vec<String>),
    /// `STLS`.
    Stls,
    /// `TOP`.
    Top,
    /// `UIDL`.
    Uidl,
    /// `USER`.
    User,
    /// Derived from a successfully parsed APOP timestamp in the greeting,
    /// not from `CAPA` (SUPPLEMENT: APOP capability flag derived from the
    /// greeting).
    Apop,
    /// Anything `CAPA` reports that isn't in the table above.
    Unknown(String),
}

/// Parses one `CAPA` response line into a [`Capability`].
#[must_use]
pub fn parse_capa_line(line: &str) -> Capability {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Capability::Unknown(String::new());
    };
    match name.to_ascii_uppercase().as_str() {
        "LOGIN-DELAY" => parts
            .next()
            .and_then(|s| s.parse().ok())
            .map_or_else(|| Capability::Unknown(line.to_string()), Capability::LoginDelay),
        "PIPELINING" => Capability::Pipelining,
        "RESP-CODES" => Capability::RespCodes,
        "SASL" => Capability::Sasl(parts.map(str::to_string).collect()),
        "STLS" => Capability::Stls,
        "TOP" => Capability::Top,
        "UIDL" => Capability::Uidl,
        "USER" => Capability::User,
        _ => Capability::Unknown(line.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_commands_without_trailing_crlf() {
        assert_eq!(Command::User("alice".to_string()).render(), "USER alice");
        assert_eq!(Command::Top(3, 10).render(), "TOP 3 10");
        assert_eq!(Command::List(None).render(), "LIST");
        assert_eq!(Command::List(Some(2)).render(), "LIST 2");
    }

    #[test]
    fn multiline_classification_matches_spec_table() {
        assert!(Command::Capa.is_multiline());
        assert!(Command::List(None).is_multiline());
        assert!(!Command::List(Some(1)).is_multiline());
        assert!(Command::Retr(1).is_multiline());
        assert!(Command::Retr(1).is_raw_body());
        assert!(!Command::Uidl(None).is_raw_body());
    }

    #[test]
    fn parses_capa_table_entries() {
        assert_eq!(parse_capa_line("TOP"), Capability::Top);
        assert_eq!(parse_capa_line("LOGIN-DELAY 180"), Capability::LoginDelay(180));
        assert_eq!(
            parse_capa_line("SASL PLAIN CRAM-MD5"),
            Capability::Sasl(vec!["PLAIN".to_string(), "CRAM-MD5".to_string()])
        );
        assert_eq!(parse_capa_line("XFOO BAR"), Capability::Unknown("XFOO BAR".to_string()));
    }
}
