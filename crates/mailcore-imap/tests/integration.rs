//! Integration tests for the IMAP protocol engine.
//!
//! These drive [`mailcore_imap::engine::Engine`] against an in-memory mock
//! stream to simulate IMAP server responses without a real connection: the
//! engine is a blocking, synchronous state machine, so no async runtime is
//! needed here.

use std::io::{self, Read, Write};

use mailcore_imap::engine::Engine;
use mailcore_imap::types::{Capability, Flag, SequenceSet};
use mailcore_imap::{Command, FetchItems, Response, ResponseParser, UntaggedResponse};

/// A fixed script of bytes to hand back on read, capturing whatever gets
/// written (the rendered command lines) for inspection.
struct MockStream {
    responses: io::Cursor<Vec<u8>>,
    sent: Vec<u8>,
}

impl MockStream {
    fn new(responses: &[u8]) -> Self {
        Self { responses: io::Cursor::new(responses.to_vec()), sent: Vec::new() }
    }

    #[allow(dead_code)]
    fn sent_text(&self) -> String {
        String::from_utf8_lossy(&self.sent).into_owned()
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.responses.read(buf)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sent.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn no_reconnect() -> mailcore_imap::Result<MockStream> {
    Err(mailcore::Error::ServiceNotConnected.into())
}

#[test]
fn test_parser_capability() {
    let response = b"* CAPABILITY IMAP4rev1 IDLE NAMESPACE\r\n";
    let parsed = ResponseParser::parse(response).unwrap();

    match parsed {
        Response::Untagged(UntaggedResponse::Capability(caps)) => {
            assert!(caps.iter().any(|c| matches!(c, Capability::Imap4Rev1)));
            assert!(caps.iter().any(|c| matches!(c, Capability::Idle)));
        }
        _ => panic!("Expected capability response"),
    }
}

#[test]
fn test_parser_exists() {
    let response = b"* 23 EXISTS\r\n";
    let parsed = ResponseParser::parse(response).unwrap();

    match parsed {
        Response::Untagged(UntaggedResponse::Exists(n)) => {
            assert_eq!(n, 23);
        }
        _ => panic!("Expected EXISTS response"),
    }
}

#[test]
fn test_parser_fetch_response() {
    let response = b"* 12 FETCH (FLAGS (\\Seen) UID 100)\r\n";
    let parsed = ResponseParser::parse(response).unwrap();

    match parsed {
        Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
            assert_eq!(seq.get(), 12);
            assert!(!items.is_empty());
        }
        _ => panic!("Expected FETCH response"),
    }
}

#[test]
fn test_parser_list_response() {
    let response = b"* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n";
    let parsed = ResponseParser::parse(response).unwrap();

    match parsed {
        Response::Untagged(UntaggedResponse::List(list)) => {
            assert_eq!(list.mailbox.as_str(), "INBOX");
            assert_eq!(list.delimiter, Some('/'));
        }
        _ => panic!("Expected LIST response"),
    }
}

#[test]
fn test_parser_lsub_response() {
    let response = b"* LSUB () \".\" \"Archive\"\r\n";
    let parsed = ResponseParser::parse(response).unwrap();

    match parsed {
        Response::Untagged(UntaggedResponse::Lsub(list)) => {
            assert_eq!(list.mailbox.as_str(), "Archive");
            assert_eq!(list.delimiter, Some('.'));
        }
        _ => panic!("Expected LSUB response"),
    }
}

#[test]
fn test_parser_tagged_ok() {
    let response = b"A001 OK LOGIN completed\r\n";
    let parsed = ResponseParser::parse(response).unwrap();

    match parsed {
        Response::Tagged { tag, status, text, .. } => {
            assert_eq!(tag.as_str(), "A001");
            assert!(status.is_ok());
            assert!(text.contains("LOGIN"));
        }
        _ => panic!("Expected tagged response"),
    }
}

#[test]
fn test_sequence_set_display() {
    let seq = SequenceSet::range(1, 10).unwrap();
    assert_eq!(seq.to_string(), "1:10");

    let seq = SequenceSet::All;
    assert_eq!(seq.to_string(), "*");
}

#[test]
fn test_fetch_items_display() {
    let _fast = FetchItems::Fast;
    let _full = FetchItems::Full;
    let _all = FetchItems::All;
}

#[test]
fn test_flags_parsing() {
    assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
    assert_eq!(Flag::parse("\\Flagged"), Flag::Flagged);
    assert_eq!(Flag::parse("\\Deleted"), Flag::Deleted);
    assert_eq!(Flag::parse("\\Draft"), Flag::Draft);
    assert_eq!(Flag::parse("\\Answered"), Flag::Answered);
    assert_eq!(Flag::parse("\\Recent"), Flag::Recent);

    match Flag::parse("$Important") {
        Flag::Keyword(s) => assert_eq!(s, "$Important"),
        _ => panic!("Expected keyword flag"),
    }
}

#[test]
fn test_capability_parsing() {
    assert!(matches!(Capability::parse("IMAP4rev1"), Capability::Imap4Rev1));
    assert!(matches!(Capability::parse("IMAP4rev2"), Capability::Imap4Rev2));
    assert!(matches!(Capability::parse("IDLE"), Capability::Idle));
    assert!(matches!(Capability::parse("MOVE"), Capability::Move));

    match Capability::parse("AUTH=PLAIN") {
        Capability::Auth(mech) => assert_eq!(mech, "PLAIN"),
        _ => panic!("Expected AUTH capability"),
    }
}

#[test]
fn test_engine_drives_capability_command_to_completion() {
    let stream = MockStream::new(b"* CAPABILITY IMAP4rev1 IDLE UIDPLUS\r\nA0000 OK CAPABILITY completed\r\n");
    let mut engine = Engine::new(stream);

    let id = engine.queue(Command::Capability, None);
    let done = loop {
        let finished = engine.iterate(no_reconnect).unwrap();
        if finished == id {
            break finished;
        }
    };
    assert_eq!(done, id);

    let completed = engine.take_result(id).expect("capability command completed");
    assert!(completed.result.is_ok());
    assert!(engine.capabilities().iter().any(|c| matches!(c, Capability::Idle)));
    assert!(engine.capabilities().iter().any(|c| matches!(c, Capability::UidPlus)));
}

#[test]
fn test_engine_surfaces_tagged_no() {
    let stream = MockStream::new(b"A0000 NO [TRYCREATE] mailbox does not exist\r\n");
    let mut engine = Engine::new(stream);

    let id = engine.queue(Command::Select { mailbox: mailcore_imap::types::Mailbox::new("Archive"), condstore: false }, None);
    let done = loop {
        let finished = engine.iterate(no_reconnect).unwrap();
        if finished == id {
            break finished;
        }
    };
    let completed = engine.take_result(done).expect("select command completed");
    assert!(!completed.result.is_ok());
    assert!(completed.resp_codes.iter().any(|c| matches!(c, mailcore_imap::types::ResponseCode::TryCreate)));
}
