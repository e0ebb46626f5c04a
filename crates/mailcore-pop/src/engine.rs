//! Component F: the blocking POP3 command engine.
//!
//! A simpler sibling of [`mailcore_imap::engine::Engine`]: single-command-
//! at-a-time, no prequeue, no untagged dispatch — just a greeting parse,
//! a `+OK`/`-ERR` status word per command, and an optional multi-line
//! block (CAPA/LIST/UIDL's textual lines, or RETR/TOP's raw body) read
//! through component C.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};

use mailcore::io::write_all_cancellable;
use mailcore::Error as CoreError;

use crate::command::{parse_capa_line, Capability, Command};
use crate::error::{Error, Result};
use crate::stream::PopLineStream;

/// Where the connection is in the POP3 session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No usable connection.
    Disconnected,
    /// Connected, greeting not yet read.
    Connect,
    /// Greeting read, `USER`/`PASS`/`APOP`/`AUTH` not yet completed.
    Auth,
    /// Authenticated; mailbox commands are valid.
    Transaction,
    /// `QUIT` issued; server is committing deletions.
    Update,
}

/// Outcome of a completed command's status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// `+OK [rest]`.
    Ok(String),
    /// `-ERR [rest]`.
    Err(String),
}

impl CommandResult {
    /// True for `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// What [`Engine::take_result`] hands back once a command's id has been
/// reported by [`Engine::iterate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCommand {
    /// The tagged-equivalent status line result.
    pub result: CommandResult,
    /// Textual lines of a CAPA/LIST/UIDL multi-line response (empty for
    /// single-line commands and for RETR/TOP, whose payload is in `body`).
    pub lines: Vec<String>,
    /// Raw body bytes for RETR/TOP, already CRLF-canonicalised and
    /// dot-unstuffed by component C. `None` for every other command.
    pub body: Option<Vec<u8>>,
}

struct QueuedCommand {
    id: i64,
    command: Command,
    retries: u32,
    result: Option<CommandResult>,
    lines: Vec<String>,
    body: Option<Vec<u8>>,
}

/// Blocking, single-threaded command queue engine for one POP3 connection.
pub struct Engine<S> {
    stream: Option<PopLineStream<S>>,
    queue: VecDeque<QueuedCommand>,
    nextid: i64,
    state: EngineState,
    capabilities: Vec<Capability>,
    reconnecting: bool,
    completed: HashMap<i64, CompletedCommand>,
}

impl<S> Engine<S>
where
    S: Read + Write,
{
    /// Reads and validates the greeting line off a freshly connected
    /// stream, extracting an APOP timestamp if present (SUPPLEMENT:
    /// APOP capability flag derived from the greeting), and moves to
    /// `Auth`.
    ///
    /// # Errors
    /// Returns an error if the greeting isn't a well-formed `+OK` line.
    pub fn new(stream: S) -> Result<Self> {
        let mut line_stream = PopLineStream::new(stream);
        let greeting = line_stream.next_line()?;
        let Some(rest) = greeting.strip_prefix("+OK") else {
            return Err(Error::Err(greeting));
        };

        let mut capabilities = Vec::new();
        let apop_timestamp = extract_angle_bracket(rest.trim_start());
        if apop_timestamp.is_some() {
            capabilities.push(Capability::Apop);
        }

        Ok(Engine {
            stream: Some(line_stream),
            queue: VecDeque::new(),
            nextid: 1,
            state: EngineState::Auth,
            capabilities,
            reconnecting: false,
            completed: HashMap::new(),
        })
    }

    /// Removes and returns a completed command's result, if `id` has
    /// finished.
    pub fn take_result(&mut self, id: i64) -> Option<CompletedCommand> {
        self.completed.remove(&id)
    }

    /// Swaps the underlying transport after an external `STLS` upgrade,
    /// resetting component C's buffering so the next response is read
    /// cleanly on the new (encrypted) stream. The engine itself stays
    /// generic over the transport type; TLS negotiation is the caller's
    /// responsibility, same as IMAP's `STARTTLS`.
    pub fn replace_stream(&mut self, new_inner: S) {
        self.stream = Some(PopLineStream::new(new_inner));
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &EngineState {
        &self.state
    }

    /// Capabilities negotiated via `CAPA`, plus `Apop` if the greeting
    /// carried a timestamp.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Queues a command at the tail, returning its id.
    pub fn queue(&mut self, command: Command) -> i64 {
        let id = self.nextid;
        self.nextid = if self.nextid == i64::from(i32::MAX) { 1 } else { self.nextid + 1 };
        self.queue.push_back(QueuedCommand {
            id,
            command,
            retries: 0,
            result: None,
            lines: Vec::new(),
            body: None,
        });
        id
    }

    fn stream_mut(&mut self) -> Result<&mut PopLineStream<S>> {
        self.stream.as_mut().ok_or_else(|| CoreError::ServiceNotConnected.into())
    }

    /// Runs one step: reconnect if disconnected, otherwise drive the head
    /// command to completion. Returns the id of the command that
    /// completed, `0` if the queue was empty, or `-1` on a retry-in-
    /// progress step.
    ///
    /// # Errors
    /// Returns an error if the connection is down with no reconnect hook,
    /// or the server violates the protocol.
    pub fn iterate(&mut self, mut reconnect: impl FnMut() -> Result<S>) -> Result<i64> {
        if matches!(self.state, EngineState::Disconnected) && !self.reconnecting {
            self.reconnecting = true;
            let result = reconnect();
            self.reconnecting = false;
            match result {
                Ok(new_stream) => {
                    let engine = Self::new(new_stream)?;
                    self.stream = engine.stream;
                    self.state = engine.state;
                    self.capabilities = engine.capabilities;
                }
                Err(e) => {
                    match self.queue.front_mut() {
                        Some(head) if head.retries < 3 => {
                            head.retries += 1;
                            return Ok(-1);
                        }
                        Some(_) => {
                            self.queue.pop_front();
                        }
                        None => {}
                    }
                    return Err(e);
                }
            }
        }

        let Some(mut head) = self.queue.pop_front() else {
            return Ok(0);
        };

        match self.run_command(&mut head) {
            Ok(()) => {
                self.apply_state_change(&head);
                let id = head.id;
                if let Some(result) = head.result {
                    self.completed.insert(
                        id,
                        CompletedCommand {
                            result,
                            lines: head.lines,
                            body: head.body,
                        },
                    );
                }
                Ok(id)
            }
            Err(e) => {
                let disconnected = e.downcast_disconnecting();
                if disconnected {
                    self.state = EngineState::Disconnected;
                    self.stream = None;
                }
                if disconnected || head.retries < 3 {
                    head.retries += 1;
                    head.result = None;
                    head.lines.clear();
                    head.body = None;
                    self.queue.push_front(head);
                    Ok(-1)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn apply_state_change(&mut self, cmd: &QueuedCommand) {
        let ok = cmd.result.as_ref().is_some_and(CommandResult::is_ok);
        match &cmd.command {
            Command::Apop { .. } | Command::Pass(_) | Command::Auth { .. } if ok => {
                self.state = EngineState::Transaction;
            }
            Command::Quit if ok => {
                self.state = EngineState::Update;
            }
            Command::Stls if ok => {
                if let Some(stream) = self.stream.as_mut() {
                    stream.reset();
                }
            }
            _ => {}
        }
    }

    fn run_command(&mut self, cmd: &mut QueuedCommand) -> Result<()> {
        let line = cmd.command.render();
        {
            let stream = self.stream_mut()?;
            write_all_cancellable(stream.inner_mut(), format!("{line}\r\n").as_bytes()).map_err(core_io)?;
            stream.inner_mut().flush().map_err(core_io)?;
        }

        let status_line = self.stream_mut()?.next_line()?;
        let (ok, rest) = classify_status(&status_line)?;

        if !ok {
            cmd.result = Some(CommandResult::Err(rest));
            return Ok(());
        }

        if cmd.command.is_multiline() {
            self.read_multiline(cmd)?;
        }

        cmd.result = Some(CommandResult::Ok(rest));
        Ok(())
    }

    fn read_multiline(&mut self, cmd: &mut QueuedCommand) -> Result<()> {
        let raw_body = cmd.command.is_raw_body();
        let stream = self.stream_mut()?;
        stream.begin_data();

        if raw_body {
            let mut body = Vec::new();
            loop {
                let chunk = stream.next_data_chunk()?;
                if stream.is_eod() {
                    break;
                }
                body.extend_from_slice(&chunk);
            }
            cmd.body = Some(body);
        } else {
            let mut lines = Vec::new();
            loop {
                let chunk = stream.next_data_chunk()?;
                if stream.is_eod() {
                    break;
                }
                let mut trimmed = chunk;
                if trimmed.last() == Some(&b'\n') {
                    trimmed.pop();
                }
                lines.push(String::from_utf8_lossy(&trimmed).into_owned());
            }
            if matches!(cmd.command, Command::Capa) {
                let mut capabilities: Vec<Capability> = lines.iter().map(|l| parse_capa_line(l)).collect();
                if self.capabilities.iter().any(|c| matches!(c, Capability::Apop)) {
                    capabilities.push(Capability::Apop);
                }
                self.capabilities = capabilities;
            }
            cmd.lines = lines;
        }
        Ok(())
    }
}

/// Extracts the `<...>` timestamp token from a POP greeting, if present.
fn extract_angle_bracket(rest: &str) -> Option<String> {
    let start = rest.find('<')?;
    let end = rest[start..].find('>')? + start;
    Some(rest[start..=end].to_string())
}

/// Classifies a status line into (`ok`, rest-of-line-after-the-word).
/// `+OK`/`-ERR` are the normal cases; a bare `+ ` continuation (valid only
/// while an `AUTH` exchange is in progress) is treated as a positive
/// interim result so the caller can inspect its text.
fn classify_status(line: &str) -> Result<(bool, String)> {
    if let Some(rest) = line.strip_prefix("+OK") {
        Ok((true, rest.trim_start().to_string()))
    } else if let Some(rest) = line.strip_prefix("-ERR") {
        Ok((false, rest.trim_start().to_string()))
    } else if let Some(rest) = line.strip_prefix('+') {
        Ok((true, rest.trim_start().to_string()))
    } else {
        Err(Error::parse(0, format!("unexpected status line: {line}")))
    }
}

fn core_io(e: io::Error) -> Error {
    Error::Core(CoreError::System(e))
}

trait DisconnectingExt {
    fn downcast_disconnecting(&self) -> bool;
}

impl DisconnectingExt for Error {
    fn downcast_disconnecting(&self) -> bool {
        match self {
            Error::Core(c) => c.is_disconnecting(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FakeStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl FakeStream {
        fn new(input: &[u8]) -> Self {
            Self { input: Cursor::new(input.to_vec()), output: Vec::new() }
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn no_reconnect() -> Result<FakeStream> {
        Err(CoreError::ServiceNotConnected.into())
    }

    #[test]
    fn greeting_with_apop_timestamp_sets_capability() {
        let stream = FakeStream::new(b"+OK POP3 server ready <1896.697170952@dbc.mtview.ca.us>\r\n");
        let engine = Engine::new(stream).expect("valid greeting");
        assert!(matches!(engine.state(), EngineState::Auth));
        assert!(engine.capabilities().iter().any(|c| matches!(c, Capability::Apop)));
    }

    #[test]
    fn greeting_without_ok_is_an_error() {
        let stream = FakeStream::new(b"-ERR too many connections\r\n");
        assert!(Engine::new(stream).is_err());
    }

    #[test]
    fn user_then_pass_transitions_to_transaction() {
        let stream = FakeStream::new(b"+OK ready\r\n+OK\r\n+OK maildrop locked\r\n");
        let mut engine = Engine::new(stream).expect("greeting");

        let user_id = engine.queue(Command::User("alice".to_string()));
        let done = engine.iterate(no_reconnect).expect("iterate");
        assert_eq!(done, user_id);
        assert!(matches!(engine.state(), EngineState::Auth));

        let pass_id = engine.queue(Command::Pass("secret".to_string()));
        let done = engine.iterate(no_reconnect).expect("iterate");
        assert_eq!(done, pass_id);
        assert!(matches!(engine.state(), EngineState::Transaction));
    }

    #[test]
    fn capa_parses_multiline_table() {
        let stream = FakeStream::new(b"+OK ready\r\n+OK Capability list follows\r\nTOP\r\nUIDL\r\nSASL PLAIN\r\n.\r\n");
        let mut engine = Engine::new(stream).expect("greeting");
        let id = engine.queue(Command::Capa);
        let done = engine.iterate(no_reconnect).expect("iterate");
        assert_eq!(done, id);
        let completed = engine.take_result(id).expect("capa completed");
        assert!(completed.result.is_ok());
        assert!(engine.capabilities().iter().any(|c| matches!(c, Capability::Top)));
        assert!(engine.capabilities().iter().any(|c| matches!(c, Capability::Uidl)));
    }

    #[test]
    fn retr_collects_raw_unstuffed_body() {
        let stream = FakeStream::new(b"+OK ready\r\n+OK 120 octets\r\nSubject: hi\r\n..dot\r\n.\r\n");
        let mut engine = Engine::new(stream).expect("greeting");
        let id = engine.queue(Command::Retr(1));
        let done = engine.iterate(no_reconnect).expect("iterate");
        assert_eq!(done, id);
        let completed = engine.take_result(id).expect("retr completed");
        assert_eq!(completed.body.expect("body present"), b"Subject: hi\n.dot\n");
    }

    #[test]
    fn negative_response_does_not_consume_a_multiline_block() {
        let stream = FakeStream::new(b"+OK ready\r\n-ERR no such message\r\n");
        let mut engine = Engine::new(stream).expect("greeting");
        let id = engine.queue(Command::Retr(99));
        let done = engine.iterate(no_reconnect).expect("iterate");
        assert_eq!(done, id);
        let completed = engine.take_result(id).expect("result recorded");
        assert!(!completed.result.is_ok());
    }
}
