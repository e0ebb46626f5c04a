//! Component E: the blocking IMAP command engine.
//!
//! Grounded in `spruce-imap-engine.c`'s single-threaded, step-wise
//! dispatcher: commands are queued FIFO (with privileged `prequeue` head
//! insertion), [`Engine::iterate`] is the sole blocking step function, and
//! untagged responses are dispatched synchronously before `iterate`
//! returns. There is no pipelining — one command is in flight at a time.
//!
//! Reading a response line means bridging [`crate::parser::lexer::TokenStream`]
//! (component B, which owns literal splicing) into the byte slice
//! [`crate::parser::ResponseParser`] (grounded on [`crate::parser::lexer::LineLexer`])
//! expects: [`assemble_line`] re-renders one logical line's tokens back
//! into bytes, inlining any literal bodies, so the structural parser never
//! has to know about refilling.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};

use mailcore::io::write_all_cancellable;
use mailcore::Error as CoreError;

use crate::command::{Command, Part, TagGenerator};
use crate::error::{Error, Result};
use crate::parser::lexer::{Token, TokenStream};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, Mailbox, ResponseCode, Status};

/// What state the connection's authentication/selection machine is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// No usable connection.
    Disconnected,
    /// Connected, greeting received, not logged in.
    Connected,
    /// Logged in, no mailbox selected.
    Authenticated,
    /// A mailbox is open.
    Selected(Mailbox),
}

/// Outcome of a completed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Tagged OK.
    Ok(Option<ResponseCode>, String),
    /// Tagged NO.
    No(Option<ResponseCode>, String),
    /// Tagged BAD.
    Bad(Option<ResponseCode>, String),
}

impl CommandResult {
    /// True for `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(..))
    }
}

/// What [`Engine::take_result`] hands back once a command's id has been
/// reported by [`Engine::iterate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedCommand {
    /// Tagged completion status.
    pub result: CommandResult,
    /// Response codes collected while the command was in flight.
    pub resp_codes: Vec<ResponseCode>,
    /// Every untagged response seen while the command was in flight, in
    /// wire order (EXISTS/EXPUNGE/FETCH/LIST/SEARCH/STATUS and friends).
    /// Folder-level operations (component H) read this to learn what
    /// changed rather than re-querying.
    pub untagged: Vec<UntaggedResponse>,
}

/// A marker stashed on an engine-owned prequeued SELECT/EXAMINE, so its
/// completion handler knows to fail the *next* queued command instead of
/// surfacing the error to whoever issued the original prequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Caller,
    AutoSelect,
}

/// One command sitting in the engine's queue.
struct QueuedCommand {
    id: i64,
    tag: String,
    folder: Option<Mailbox>,
    is_select_like: bool,
    owner: Owner,
    parts: VecDeque<Part>,
    resp_codes: Vec<ResponseCode>,
    untagged: Vec<UntaggedResponse>,
    result: Option<CommandResult>,
    retries: u32,
    /// The command, kept so a retry can re-render its parts.
    command: Command,
}

/// A snapshot of an untagged response collected while a command was
/// in flight, handed back to the caller alongside the command result.
pub type UntaggedLog = Vec<UntaggedResponse>;

/// Blocking, single-threaded command queue engine for one IMAP connection.
pub struct Engine<S> {
    stream: Option<TokenStream<S>>,
    queue: VecDeque<QueuedCommand>,
    nextid: i64,
    tags: TagGenerator,
    state: EngineState,
    capabilities: Vec<Capability>,
    literal_plus: bool,
    reconnecting: bool,
    completed: HashMap<i64, CompletedCommand>,
}

impl<S> Engine<S>
where
    S: Read + Write,
{
    /// Wraps a freshly connected stream. The caller is expected to have
    /// already read and checked the server greeting.
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(TokenStream::new(stream)),
            queue: VecDeque::new(),
            nextid: 1,
            tags: TagGenerator::new(),
            state: EngineState::Connected,
            capabilities: Vec::new(),
            literal_plus: false,
            reconnecting: false,
            completed: HashMap::new(),
        }
    }

    /// Removes and returns a completed command's result, if `id` has
    /// finished. Callers poll this after seeing `iterate` return `id`.
    pub fn take_result(&mut self, id: i64) -> Option<CompletedCommand> {
        self.completed.remove(&id)
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &EngineState {
        &self.state
    }

    /// Negotiated capabilities (populated after the first CAPABILITY
    /// response, from the greeting's response-code or an explicit command).
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn has_literal_plus(caps: &[Capability]) -> bool {
        caps.iter().any(|c| matches!(c, Capability::LiteralPlus))
    }

    /// Queues a command at the tail, returning its id. `folder` is set
    /// for commands the engine should auto-SELECT before running.
    pub fn queue(&mut self, command: Command, folder: Option<Mailbox>) -> i64 {
        let id = self.nextid;
        self.nextid = if self.nextid == i64::from(i32::MAX) {
            1
        } else {
            self.nextid + 1
        };
        let is_select_like = matches!(command, Command::Select { .. } | Command::Examine { .. });
        self.queue.push_back(QueuedCommand {
            id,
            tag: String::new(),
            folder,
            is_select_like,
            owner: Owner::Caller,
            parts: VecDeque::new(),
            resp_codes: Vec::new(),
            untagged: Vec::new(),
            result: None,
            retries: 0,
            command,
        });
        id
    }

    /// Inserts `command` at the head of the queue, ahead of everything
    /// already queued. Renumbers the whole queue if the new id would hit
    /// zero or collide, per the original's prequeue-id scheme.
    fn prequeue(&mut self, command: Command, owner: Owner) -> i64 {
        let new_id = self.queue.front().map_or(self.nextid - 1, |head| head.id - 1);
        let is_select_like = matches!(command, Command::Select { .. } | Command::Examine { .. });
        let qc = QueuedCommand {
            id: new_id,
            tag: String::new(),
            folder: None,
            is_select_like,
            owner,
            parts: VecDeque::new(),
            resp_codes: Vec::new(),
            untagged: Vec::new(),
            result: None,
            retries: 0,
            command,
        };
        if new_id <= 0 {
            // Renumber 1..n (new command included) and reset nextid to n+1.
            self.queue.push_front(qc);
            let mut n = 1i64;
            for item in &mut self.queue {
                item.id = n;
                n += 1;
            }
            self.nextid = n;
        } else {
            self.queue.push_front(qc);
        }
        self.queue.front().map_or(0, |c| c.id)
    }

    fn stream_mut(&mut self) -> Result<&mut TokenStream<S>> {
        self.stream.as_mut().ok_or_else(|| CoreError::ServiceNotConnected.into())
    }

    /// Runs one step of work: auto-SELECT prequeue check, reconnect check,
    /// then drives the head command's parts to completion (or to the next
    /// suspension point). Returns the id of the command that completed,
    /// `0` if the queue was empty, or propagates an error.
    ///
    /// # Errors
    /// Returns an error if the connection is down and no reconnect hook was
    /// supplied, or if the server violates the protocol.
    pub fn iterate(&mut self, mut reconnect: impl FnMut() -> Result<S>) -> Result<i64> {
        if matches!(self.state, EngineState::Disconnected) && !self.reconnecting {
            self.reconnecting = true;
            let result = reconnect();
            self.reconnecting = false;
            match result {
                Ok(new_stream) => {
                    self.stream = Some(TokenStream::new(new_stream));
                    self.state = EngineState::Connected;
                }
                Err(e) => {
                    // Reconnect failed: give the head command (if any) up to
                    // 3 more iterate() calls to try again before dropping it.
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

        self.auto_select_prequeue();

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
                            resp_codes: head.resp_codes,
                            untagged: head.untagged,
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
                    head.tag.clear();
                    head.parts.clear();
                    head.resp_codes.clear();
                    head.untagged.clear();
                    head.result = None;
                    self.queue.push_front(head);
                    Ok(-1)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn auto_select_prequeue(&mut self) {
        let Some(head) = self.queue.front() else { return };
        if head.is_select_like || head.folder.is_none() || head.result.is_some() {
            return;
        }
        let needs_select = match (&self.state, &head.folder) {
            (EngineState::Selected(current), Some(wanted)) => current != wanted,
            (EngineState::Selected(_), None) => false,
            _ => true,
        };
        if needs_select {
            let folder = head.folder.clone().expect("checked above");
            let select = Command::Select {
                mailbox: folder,
                condstore: false,
            };
            self.prequeue(select, Owner::AutoSelect);
        }
    }

    fn apply_state_change(&mut self, cmd: &QueuedCommand) {
        let ok = cmd.result.as_ref().is_some_and(CommandResult::is_ok);
        match &cmd.command {
            Command::Select { mailbox, .. } | Command::Examine { mailbox } => {
                if ok {
                    self.state = EngineState::Selected(mailbox.clone());
                } else if cmd.owner == Owner::AutoSelect {
                    if let Some(mut next) = self.queue.pop_front() {
                        next.result = cmd.result.clone();
                        self.queue.push_front(next);
                    }
                }
            }
            Command::Close | Command::Unselect => {
                if ok {
                    self.state = EngineState::Authenticated;
                }
            }
            Command::Logout => {
                if ok {
                    self.state = EngineState::Disconnected;
                }
            }
            Command::Login { .. } | Command::Authenticate { .. } => {
                if ok && matches!(self.state, EngineState::Connected) {
                    self.state = EngineState::Authenticated;
                }
            }
            _ => {}
        }
    }

    /// Drives one command's parts to completion.
    fn run_command(&mut self, cmd: &mut QueuedCommand) -> Result<()> {
        if cmd.result.is_some() {
            // A failed auto-SELECT already stashed its error here before
            // this command ever reached the wire; nothing left to send.
            return Ok(());
        }

        if cmd.tag.is_empty() {
            cmd.tag = self.tags.next();
            cmd.parts = cmd.command.parts(&cmd.tag, self.literal_plus).into();
        }

        while let Some(part) = cmd.parts.pop_front() {
            let is_last = cmd.parts.is_empty();
            match part {
                Part::Text(bytes) => {
                    let stream = self.stream_mut()?;
                    write_all_cancellable(stream.inner_mut(), &bytes).map_err(core_io)?;
                    stream.inner_mut().flush().map_err(core_io)?;
                }
                Part::Literal { data, sync } => {
                    if sync {
                        self.await_continuation(cmd)?;
                    }
                    let stream = self.stream_mut()?;
                    write_all_cancellable(stream.inner_mut(), &data).map_err(core_io)?;
                    stream.inner_mut().flush().map_err(core_io)?;
                }
            }
            if is_last {
                return self.await_completion(cmd);
            }
        }
        self.await_completion(cmd)
    }

    /// Reads responses until a `+` continuation is seen (streaming any
    /// untagged data along the way).
    fn await_continuation(&mut self, cmd: &mut QueuedCommand) -> Result<()> {
        loop {
            let response = self.read_one_response()?;
            match response {
                Response::Continuation { .. } => return Ok(()),
                Response::Untagged(u) => self.dispatch_untagged(cmd, u),
                Response::Tagged { tag, status, code, text } if tag.as_str() == cmd.tag => {
                    cmd.resp_codes.extend(code.clone());
                    cmd.result = Some(to_result(status, code, text));
                    return Err(Error::Core(CoreError::ServiceProtocolError(
                        "server completed command before literal was sent".to_string(),
                    )));
                }
                Response::Tagged { .. } => {}
            }
        }
    }

    /// Reads responses until this command's tagged completion arrives.
    fn await_completion(&mut self, cmd: &mut QueuedCommand) -> Result<()> {
        loop {
            let response = self.read_one_response()?;
            match response {
                Response::Untagged(u) => self.dispatch_untagged(cmd, u),
                Response::Continuation { .. } => {}
                Response::Tagged { tag, status, code, text } => {
                    if tag.as_str() != cmd.tag {
                        continue;
                    }
                    cmd.resp_codes.extend(code.clone());
                    cmd.result = Some(to_result(status, code, text));
                    return Ok(());
                }
            }
        }
    }

    fn dispatch_untagged(&mut self, cmd: &mut QueuedCommand, u: UntaggedResponse) {
        match &u {
            UntaggedResponse::Bye { .. } => {
                self.state = EngineState::Disconnected;
                self.stream = None;
            }
            UntaggedResponse::Capability(caps) => {
                self.literal_plus = Self::has_literal_plus(caps);
                self.capabilities = caps.clone();
            }
            other => cmd.resp_codes.extend(response_code_of(other)),
        }
        cmd.untagged.push(u);
    }

    /// Assembles one logical response line off the wire and structurally
    /// parses it.
    fn read_one_response(&mut self) -> Result<Response> {
        let stream = self.stream_mut()?;
        let first = stream.next_token()?;
        if matches!(first, Token::NoData) {
            return Err(Error::Core(CoreError::ServiceProtocolError(
                "disconnected waiting for a response".to_string(),
            )));
        }
        let line = assemble_line(stream, first)?;
        ResponseParser::parse(&line)
    }
}

fn to_result(status: Status, code: Option<ResponseCode>, text: String) -> CommandResult {
    match status {
        Status::Ok | Status::PreAuth => CommandResult::Ok(code, text),
        Status::No => CommandResult::No(code, text),
        Status::Bad => CommandResult::Bad(code, text),
        Status::Bye => CommandResult::No(code, text),
    }
}

/// Most untagged data-item responses don't carry a response-code; this
/// only applies to the OK/NO/BAD/PREAUTH family, which [`dispatch_untagged`]
/// already special-cases by variant when it matters. Kept narrow on
/// purpose: unmodelled untagged kinds simply contribute no response-code.
fn response_code_of(u: &UntaggedResponse) -> Option<ResponseCode> {
    match u {
        UntaggedResponse::Ok { code, .. }
        | UntaggedResponse::No { code, .. }
        | UntaggedResponse::Bad { code, .. }
        | UntaggedResponse::PreAuth { code, .. } => code.clone(),
        _ => None,
    }
}

fn core_io(e: std::io::Error) -> Error {
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

fn opens_tight(t: &Token) -> bool {
    matches!(t, Token::Char(b'(') | Token::Char(b'['))
}

fn closes_tight(t: &Token) -> bool {
    matches!(t, Token::Char(b')') | Token::Char(b']'))
}

/// Re-renders tokens back into bytes matching the wire grammar, so the
/// already-complete line can be handed to [`crate::parser::response`]'s
/// borrowed-slice parser. `first` has already been read by the caller
/// (to decide `*`/`+`/tag dispatch) and is included here.
fn assemble_line<S: Read>(ts: &mut TokenStream<S>, first: Token) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_token(&mut buf, &first, ts)?;
    let mut prev = first;
    loop {
        if matches!(prev, Token::Char(b'\n')) {
            break;
        }
        let tok = ts.next_token()?;
        if matches!(tok, Token::NoData) {
            return Err(Error::Core(CoreError::ServiceProtocolError(
                "disconnected mid-response".to_string(),
            )));
        }
        if !matches!(tok, Token::Char(b'\n')) && !opens_tight(&prev) && !closes_tight(&tok) {
            buf.push(b' ');
        }
        write_token(&mut buf, &tok, ts)?;
        prev = tok;
    }
    Ok(buf)
}

fn write_token<S: Read>(buf: &mut Vec<u8>, tok: &Token, ts: &mut TokenStream<S>) -> Result<()> {
    match tok {
        Token::Atom(s) => buf.extend_from_slice(s.as_bytes()),
        Token::Nil => buf.extend_from_slice(b"NIL"),
        Token::Number(n) => buf.extend_from_slice(n.to_string().as_bytes()),
        Token::Number64(n) => buf.extend_from_slice(n.to_string().as_bytes()),
        Token::Flag(s) => {
            buf.push(b'\\');
            buf.extend_from_slice(s.as_bytes());
        }
        Token::QString(s) => {
            buf.push(b'"');
            for b in s.bytes() {
                if b == b'"' || b == b'\\' {
                    buf.push(b'\\');
                }
                buf.push(b);
            }
            buf.push(b'"');
        }
        Token::Literal(len) => {
            let data = ts.read_literal(*len)?;
            buf.extend_from_slice(format!("{{{len}}}\r\n").as_bytes());
            buf.extend_from_slice(&data);
        }
        Token::Char(b'\n') => buf.extend_from_slice(b"\r\n"),
        Token::Char(c) => buf.push(*c),
        Token::Error(msg) => return Err(Error::parse(0, msg.clone())),
        Token::NoData => {
            return Err(Error::Core(CoreError::ServiceProtocolError(
                "disconnected mid-response".to_string(),
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::FetchItems;
    use crate::types::SequenceSet;
    use std::io::Cursor;

    /// An in-memory duplex: reads come from a canned buffer, writes go to
    /// a side buffer the test can inspect.
    struct FakeStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl FakeStream {
        fn new(input: &[u8]) -> Self {
            Self {
                input: Cursor::new(input.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn no_reconnect() -> Result<FakeStream> {
        Err(CoreError::ServiceNotConnected.into())
    }

    #[test]
    fn queue_assigns_sequential_ids_and_wraps_at_i32_max() {
        let mut engine = Engine::new(FakeStream::new(b""));
        let first = engine.queue(Command::Capability, None);
        let second = engine.queue(Command::Noop, None);
        assert_eq!(first, 1);
        assert_eq!(second, 2);

        engine.nextid = i64::from(i32::MAX);
        let third = engine.queue(Command::Noop, None);
        assert_eq!(third, i64::from(i32::MAX));
        assert_eq!(engine.nextid, 1);
    }

    #[test]
    fn prequeue_renumbers_when_it_would_hit_zero() {
        let mut engine = Engine::new(FakeStream::new(b""));
        engine.nextid = 1;
        engine.queue.push_back(QueuedCommand {
            id: 1,
            tag: String::new(),
            folder: None,
            is_select_like: false,
            owner: Owner::Caller,
            parts: VecDeque::new(),
            resp_codes: Vec::new(),
            untagged: Vec::new(),
            result: None,
            retries: 0,
            command: Command::Noop,
        });

        let prequeued_id = engine.prequeue(Command::Capability, Owner::AutoSelect);
        assert_eq!(prequeued_id, 1);
        assert_eq!(engine.queue.len(), 2);
        assert_eq!(engine.queue[0].id, 1);
        assert_eq!(engine.queue[1].id, 2);
        assert_eq!(engine.nextid, 3);
    }

    #[test]
    fn capability_round_trip_writes_command_and_reports_ok() {
        let stream = FakeStream::new(b"A0000 OK CAPABILITY completed\r\n");
        let mut engine = Engine::new(stream);
        let id = engine.queue(Command::Capability, None);

        let done = engine.iterate(no_reconnect).expect("iterate succeeds");
        assert_eq!(done, id);

        let completed = engine.take_result(id).expect("result recorded");
        assert_eq!(
            completed.result,
            CommandResult::Ok(None, "CAPABILITY completed".to_string())
        );
    }

    #[test]
    fn failed_auto_select_propagates_to_the_next_queued_command() {
        let stream = FakeStream::new(
            b"A0000 NO [TRYCREATE] no such mailbox\r\n\
              A0001 OK FETCH completed\r\n",
        );
        let mut engine = Engine::new(stream);
        let fetch_id = engine.queue(
            Command::Fetch {
                sequence: SequenceSet::single(1).expect("1 is a valid sequence number"),
                items: FetchItems::Fast,
                uid: false,
            },
            Some(Mailbox::inbox()),
        );

        // First step: the engine prequeues and runs the auto-SELECT, which
        // fails; the fetch command is never actually sent.
        let first = engine.iterate(no_reconnect).expect("iterate succeeds");
        assert_ne!(first, fetch_id);
        assert!(matches!(engine.state(), EngineState::Connected));

        let second = engine.iterate(no_reconnect).expect("iterate succeeds");
        assert_eq!(second, fetch_id);

        let completed = engine.take_result(fetch_id).expect("result recorded");
        assert!(!completed.result.is_ok());
    }

    #[test]
    fn an_empty_read_disconnects_then_gives_up_after_three_reconnect_attempts() {
        let stream = FakeStream::new(b"");
        let mut engine = Engine::new(stream);
        let _id = engine.queue(Command::Capability, None);

        // First failure: the read off the dead stream disconnects and
        // requeues the command (retries 0 -> 1).
        assert_eq!(engine.iterate(no_reconnect).expect("requeues"), -1);
        assert!(matches!(engine.state(), EngineState::Disconnected));

        // Two more failed reconnect attempts (retries 1 -> 2 -> 3).
        assert_eq!(engine.iterate(no_reconnect).expect("requeues"), -1);
        assert_eq!(engine.iterate(no_reconnect).expect("requeues"), -1);

        // Fourth attempt gives up and drops the command.
        assert!(engine.iterate(no_reconnect).is_err());

        // The queue is now empty, so a successful reconnect just leaves
        // the engine connected with nothing to run.
        let done = engine
            .iterate(|| Ok(FakeStream::new(b"")))
            .expect("reconnect succeeds");
        assert_eq!(done, 0);
        assert!(matches!(engine.state(), EngineState::Connected));
    }
}
