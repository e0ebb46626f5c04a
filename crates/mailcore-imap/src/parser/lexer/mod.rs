//! Component B: a streaming, ring-buffer IMAP tokeniser.
//!
//! Grounded in `spruce-imap-stream.c`'s `imap_fill`/`imap_token` pair: a
//! fixed-size buffer with a 128-byte head slack and a 4096-byte body is
//! refilled by shifting unread bytes toward the slack region before each
//! `read`, so a token spanning a read boundary can be rescanned from its
//! start without losing already-read bytes. Unlike the C original (which
//! hands back pointers into that buffer), tokens here are returned owned
//! (see [`Token`]'s doc comment) to sidestep self-referential borrows —
//! an explicit, spec-sanctioned alternative to tying a lifetime to the
//! stream.

mod classify;
mod slice;
mod token;

pub use slice::{LineLexer, LineToken};
pub use token::Token;

use std::io::{self, Read};

use crate::error::{Error, Result};

const HEAD_SLACK: usize = 128;
const BODY: usize = 4096;
const BUF_LEN: usize = HEAD_SLACK + BODY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Token,
    /// Reading the literal body announced by a previous `Literal` token;
    /// `remaining` bytes of raw data still need to be consumed before
    /// switching back to `Token` mode.
    Literal,
}

/// Wraps a byte stream and yields [`Token`]s one at a time, refilling its
/// internal ring buffer only when a token can't be completed from what's
/// already buffered.
pub struct TokenStream<S> {
    inner: S,
    buf: Vec<u8>,
    /// Index of the first unread byte.
    inptr: usize,
    /// Index one past the last buffered byte.
    inend: usize,
    mode: Mode,
    remaining: u32,
    disconnected: bool,
    pushback: Option<Token>,
}

impl<S: Read> TokenStream<S> {
    /// Wraps `inner` in a fresh tokeniser with an empty buffer.
    pub fn new(inner: S) -> Self {
        TokenStream {
            inner,
            buf: vec![0u8; BUF_LEN],
            inptr: HEAD_SLACK,
            inend: HEAD_SLACK,
            mode: Mode::Token,
            remaining: 0,
            disconnected: false,
            pushback: None,
        }
    }

    /// Re-synchronises the tokeniser after a reconnect: clears any
    /// buffered-but-unread bytes, pushback, and literal-mode state,
    /// exactly as `spruce_imap_stream_reset` does before a fresh greeting
    /// is read on the new connection.
    pub fn reset(&mut self) {
        self.inptr = HEAD_SLACK;
        self.inend = HEAD_SLACK;
        self.mode = Mode::Token;
        self.remaining = 0;
        self.disconnected = false;
        self.pushback = None;
    }

    /// Gives back `self.inner` for use elsewhere (e.g. to rewrap it in a
    /// TLS layer after STARTTLS negotiates). The tokeniser is reset since
    /// anything still buffered belongs to the connection being left.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Mutable access to the underlying stream, so the engine can write
    /// commands on the same connection this tokeniser reads responses from.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Pushes `token` back so the next `next_token` call returns it
    /// again. Only one slot is available — a second call before an
    /// intervening `next_token` is a caller bug.
    pub fn unget_token(&mut self, token: Token) -> Result<()> {
        if self.pushback.is_some() {
            return Err(Error::DoublePushback);
        }
        self.pushback = Some(token);
        Ok(())
    }

    fn fill(&mut self) -> io::Result<usize> {
        let inlen = self.inend - self.inptr;
        if self.inptr >= HEAD_SLACK {
            let shift = inlen.min(HEAD_SLACK);
            let target = HEAD_SLACK - shift;
            self.buf.copy_within(self.inptr..self.inend, target);
            self.inptr = target;
            self.inend = target + inlen;
        } else if self.inptr > 0 {
            let shift = self.inptr.min(self.inend.saturating_sub(HEAD_SLACK));
            self.buf.copy_within(self.inptr..self.inend, self.inptr - shift);
            self.inptr -= shift;
            self.inend = self.inptr + inlen;
        }
        if self.inend >= BUF_LEN {
            return Ok(0);
        }
        let n = self.inner.read(&mut self.buf[self.inend..BUF_LEN])?;
        if n == 0 {
            self.disconnected = true;
        }
        self.inend += n;
        Ok(self.inend - self.inptr)
    }

    /// Ensures at least one more byte is buffered, or that we know the
    /// peer has disconnected. Returns `false` on disconnect-with-no-data.
    fn ensure_byte(&mut self) -> io::Result<bool> {
        while self.inptr >= self.inend {
            if self.disconnected {
                return Ok(false);
            }
            self.fill()?;
        }
        Ok(true)
    }

    fn peek(&mut self) -> io::Result<Option<u8>> {
        if self.ensure_byte()? {
            Ok(Some(self.buf[self.inptr]))
        } else {
            Ok(None)
        }
    }

    /// Reads the next complete token, retrying a fill and rescanning from
    /// the token's start whenever the buffered data runs out mid-token.
    pub fn next_token(&mut self) -> Result<Token> {
        if let Some(t) = self.pushback.take() {
            return Ok(t);
        }

        // Skip linear whitespace between tokens, but never '\n' (its own
        // single-char token) and never while in literal mode.
        if self.mode == Mode::Token {
            loop {
                match self.peek().map_err(core_io)? {
                    Some(b) if b != b'\n' && classify::classify(b) & classify::LWSP != 0 => {
                        self.inptr += 1;
                    }
                    _ => break,
                }
            }
        }

        let Some(c) = self.peek().map_err(core_io)? else {
            return Ok(Token::NoData);
        };

        match c {
            b'"' => self.scan_qstring(),
            b'{' => self.scan_literal_prefix(),
            b'\\' => self.scan_flag(),
            b'(' | b')' | b'[' | b']' | b'*' | b'+' | b'\n' => {
                self.inptr += 1;
                Ok(Token::Char(c))
            }
            b'0'..=b'9' => self.scan_number_or_atom(),
            _ => self.scan_atom(),
        }
    }

    /// Reads exactly `len` raw bytes (the body of a previously announced
    /// literal), buffering as many refills as necessary.
    pub fn read_literal(&mut self, len: u32) -> Result<Vec<u8>> {
        self.mode = Mode::Literal;
        self.remaining = len;
        let mut out = Vec::with_capacity(len as usize);
        while self.remaining > 0 {
            if !self.ensure_byte().map_err(core_io)? {
                return Err(Error::parse(self.inptr, "disconnected mid-literal"));
            }
            let avail = (self.inend - self.inptr).min(self.remaining as usize);
            out.extend_from_slice(&self.buf[self.inptr..self.inptr + avail]);
            self.inptr += avail;
            self.remaining -= avail as u32;
        }
        self.mode = Mode::Token;
        Ok(out)
    }

    /// Reads one line (up to and consuming the terminating `\n`, `\r`
    /// dropped if present), independent of token mode. Used for reading
    /// greeting lines and raw continuation text.
    pub fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let Some(b) = self.peek().map_err(core_io)? else {
                if out.is_empty() {
                    return Err(Error::parse(self.inptr, "disconnected before line end"));
                }
                return Ok(out);
            };
            self.inptr += 1;
            if b == b'\n' {
                if out.last() == Some(&b'\r') {
                    out.pop();
                }
                return Ok(out);
            }
            out.push(b);
        }
    }

    fn scan_qstring(&mut self) -> Result<Token> {
        loop {
            let start = self.inptr;
            match self.try_scan_qstring() {
                Ok(Some(tok)) => return Ok(tok),
                Ok(None) => {
                    self.inptr = start;
                    if self.disconnected {
                        return Err(Error::parse(start, "unterminated quoted string"));
                    }
                    self.fill().map_err(core_io)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Attempts one pass over the qstring starting at `self.inptr`
    /// (which must be the opening `"`). Returns `Ok(None)` if the buffer
    /// runs out before the closing quote is seen.
    fn try_scan_qstring(&mut self) -> Result<Option<Token>> {
        let mut pos = self.inptr + 1; // skip opening quote
        let mut out = Vec::new();
        loop {
            if pos >= self.inend {
                return Ok(None);
            }
            match self.buf[pos] {
                b'"' => {
                    self.inptr = pos + 1;
                    let s = String::from_utf8(out)
                        .map_err(|_| Error::parse(pos, "invalid utf-8 in quoted string"))?;
                    return Ok(Some(Token::QString(s)));
                }
                b'\\' => {
                    pos += 1;
                    if pos >= self.inend {
                        return Ok(None);
                    }
                    match self.buf[pos] {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        other => {
                            return Err(Error::parse(pos, format!("invalid escape: \\{}", other as char)));
                        }
                    }
                    pos += 1;
                }
                b'\r' | b'\n' => {
                    return Err(Error::parse(pos, "bare CR/LF in quoted string"));
                }
                b => {
                    out.push(b);
                    pos += 1;
                }
            }
        }
    }

    fn scan_literal_prefix(&mut self) -> Result<Token> {
        loop {
            let start = self.inptr;
            match self.try_scan_literal_prefix() {
                Ok(Some(tok)) => return Ok(tok),
                Ok(None) => {
                    self.inptr = start;
                    if self.disconnected {
                        return Err(Error::parse(start, "unterminated literal prefix"));
                    }
                    self.fill().map_err(core_io)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn try_scan_literal_prefix(&mut self) -> Result<Option<Token>> {
        let mut pos = self.inptr + 1; // skip '{'
        let digits_start = pos;
        while pos < self.inend && self.buf[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos >= self.inend {
            return Ok(None);
        }
        let digits = std::str::from_utf8(&self.buf[digits_start..pos]).unwrap_or("");
        let size: u32 = digits
            .parse()
            .map_err(|_| Error::parse(digits_start, "invalid literal size"))?;
        // LITERAL+ trailing '+'
        if pos < self.inend && self.buf[pos] == b'+' {
            pos += 1;
        }
        if pos >= self.inend {
            return Ok(None);
        }
        if self.buf[pos] != b'}' {
            return Err(Error::parse(pos, "expected '}' after literal size"));
        }
        pos += 1;
        // Regular literal: must be followed by CRLF (tolerate bare LF).
        if pos >= self.inend {
            return Ok(None);
        }
        if self.buf[pos] == b'\r' {
            pos += 1;
            if pos >= self.inend {
                return Ok(None);
            }
        }
        if pos < self.inend && self.buf[pos] == b'\n' {
            pos += 1;
        }
        self.inptr = pos;
        Ok(Some(Token::Literal(size)))
    }

    fn scan_flag(&mut self) -> Result<Token> {
        loop {
            let start = self.inptr;
            match self.try_scan_flag() {
                Some(tok) => return Ok(tok),
                None => {
                    self.inptr = start;
                    if self.disconnected {
                        return Err(Error::parse(start, "unterminated flag"));
                    }
                    self.fill().map_err(core_io)?;
                }
            }
        }
    }

    fn try_scan_flag(&mut self) -> Option<Token> {
        let mut pos = self.inptr + 1; // skip '\'
        // '\*' is the special wildcard flag used in PERMANENTFLAGS.
        if pos < self.inend && self.buf[pos] == b'*' {
            self.inptr = pos + 1;
            return Some(Token::Flag("*".to_string()));
        }
        let start = pos;
        while pos < self.inend && classify::is_flag_char(self.buf[pos]) {
            pos += 1;
        }
        if pos >= self.inend && !self.disconnected {
            return None;
        }
        let name = String::from_utf8_lossy(&self.buf[start..pos]).into_owned();
        self.inptr = pos;
        Some(Token::Flag(name))
    }

    fn scan_number_or_atom(&mut self) -> Result<Token> {
        loop {
            let start = self.inptr;
            match self.try_scan_number_or_atom() {
                Ok(Some(tok)) => return Ok(tok),
                Ok(None) => {
                    self.inptr = start;
                    if self.disconnected {
                        return self.try_scan_number_or_atom_final(start);
                    }
                    self.fill().map_err(core_io)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt, returning `None` if it ran off the end of buffered
    /// data without a break character (meaning: refill and retry).
    fn try_scan_number_or_atom(&mut self) -> Result<Option<Token>> {
        let start = self.inptr;
        let mut pos = start;
        while pos < self.inend && self.buf[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos >= self.inend {
            return Ok(None);
        }
        self.finish_number_or_atom(start, pos).map(Some)
    }

    /// Same scan, but called once the peer has disconnected so running
    /// off the end of the buffer means "end of digit run", not "need
    /// more data".
    fn try_scan_number_or_atom_final(&mut self, start: usize) -> Result<Token> {
        let mut pos = start;
        while pos < self.inend && self.buf[pos].is_ascii_digit() {
            pos += 1;
        }
        self.finish_number_or_atom(start, pos)
    }

    fn finish_number_or_atom(&mut self, start: usize, digit_end: usize) -> Result<Token> {
        // A digit run immediately followed by ':' or ',' is re-interpreted
        // as an atom (APPENDUID/COPYUID "101:105" response-code args),
        // per the original's digit-run-reinterpretation workaround.
        if digit_end < self.inend && matches!(self.buf[digit_end], b':' | b',') {
            return self.scan_atom_from(start);
        }
        let digits = std::str::from_utf8(&self.buf[start..digit_end]).unwrap_or("");
        self.inptr = digit_end;
        if digits.is_empty() {
            return self.scan_atom_from(start);
        }
        match digits.parse::<u32>() {
            Ok(n) => Ok(Token::Number(n)),
            Err(_) => match digits.parse::<u64>() {
                Ok(n) => Ok(Token::Number64(n)),
                Err(_) => Ok(Token::Error(format!("number overflow: {digits}"))),
            },
        }
    }

    fn scan_atom(&mut self) -> Result<Token> {
        let start = self.inptr;
        self.scan_atom_from(start)
    }

    fn scan_atom_from(&mut self, start: usize) -> Result<Token> {
        loop {
            let mut pos = start;
            while pos < self.inend && classify::is_atom_char(self.buf[pos]) {
                pos += 1;
            }
            if pos >= self.inend && !self.disconnected {
                self.inptr = start;
                self.fill().map_err(core_io)?;
                continue;
            }
            if pos == start {
                // Nothing matched as an atom char; this is an invalid byte.
                let b = self.buf.get(start).copied().unwrap_or(0);
                self.inptr = start + 1;
                return Ok(Token::Error(format!("unexpected byte {b:#04x}")));
            }
            let s = String::from_utf8_lossy(&self.buf[start..pos]).into_owned();
            self.inptr = pos;
            return Ok(if s.eq_ignore_ascii_case("NIL") {
                Token::Nil
            } else {
                Token::Atom(s)
            });
        }
    }
}

fn core_io(e: io::Error) -> Error {
    Error::Core(mailcore::Error::System(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tokens(input: &[u8]) -> Vec<Token> {
        let mut ts = TokenStream::new(Cursor::new(input.to_vec()));
        let mut out = Vec::new();
        loop {
            match ts.next_token().unwrap() {
                Token::NoData => break,
                t => out.push(t),
            }
        }
        out
    }

    #[test]
    fn tagged_response_tokenises() {
        let toks = tokens(b"A001 OK LOGIN completed\r\n");
        assert_eq!(
            toks,
            vec![
                Token::Atom("A001".into()),
                Token::Atom("OK".into()),
                Token::Atom("LOGIN".into()),
                Token::Atom("completed".into()),
                Token::Char(b'\n'),
            ]
        );
    }

    #[test]
    fn qstring_round_trips_with_escapes() {
        let toks = tokens(b"\"hello \\\"world\\\"\"\r\n");
        assert_eq!(toks[0], Token::QString("hello \"world\"".to_string()));
    }

    #[test]
    fn digit_run_ending_in_colon_is_an_atom() {
        let toks = tokens(b"101:105 \r\n");
        assert_eq!(toks[0], Token::Atom("101:105".to_string()));
    }

    #[test]
    fn plain_number_stays_a_number() {
        let toks = tokens(b"12345 \r\n");
        assert_eq!(toks[0], Token::Number(12345));
    }

    #[test]
    fn flag_token_drops_backslash() {
        let toks = tokens(b"(\\Seen \\*)\r\n");
        assert_eq!(
            toks,
            vec![
                Token::Char(b'('),
                Token::Flag("Seen".into()),
                Token::Flag("*".into()),
                Token::Char(b')'),
                Token::Char(b'\n'),
            ]
        );
    }

    #[test]
    fn literal_prefix_then_body_via_read_literal() {
        let mut ts = TokenStream::new(Cursor::new(b"{5}\r\nhello\r\n".to_vec()));
        match ts.next_token().unwrap() {
            Token::Literal(n) => assert_eq!(n, 5),
            other => panic!("expected literal prefix, got {other:?}"),
        }
        let body = ts.read_literal(5).unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(ts.next_token().unwrap(), Token::Char(b'\n'));
    }

    #[test]
    fn literal_plus_without_trailing_crlf_still_parses_size() {
        let mut ts = TokenStream::new(Cursor::new(b"{3+}\r\nabc".to_vec()));
        assert_eq!(ts.next_token().unwrap(), Token::Literal(3));
        assert_eq!(ts.read_literal(3).unwrap(), b"abc");
    }

    #[test]
    fn one_token_pushback_then_double_pushback_errors() {
        let mut ts = TokenStream::new(Cursor::new(b"A B\r\n".to_vec()));
        let a = ts.next_token().unwrap();
        ts.unget_token(a.clone()).unwrap();
        assert_eq!(ts.next_token().unwrap(), a);
        let b = ts.next_token().unwrap();
        ts.unget_token(b.clone()).unwrap();
        assert!(ts.unget_token(Token::Nil).is_err());
    }

    #[test]
    fn token_split_across_short_reads_reassembles() {
        struct Dribble(Vec<u8>, usize);
        impl Read for Dribble {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.1 >= self.0.len() {
                    return Ok(0);
                }
                let n = 1.min(buf.len());
                buf[0] = self.0[self.1];
                self.1 += 1;
                Ok(n)
            }
        }
        let mut ts = TokenStream::new(Dribble(b"A0123456789012345678901234567890 OK\r\n".to_vec(), 0));
        let t = ts.next_token().unwrap();
        assert_eq!(t, Token::Atom("A0123456789012345678901234567890".to_string()));
    }

    #[test]
    fn read_line_strips_crlf() {
        let mut ts = TokenStream::new(Cursor::new(b"+OK greetings\r\nrest".to_vec()));
        assert_eq!(ts.read_line().unwrap(), b"+OK greetings");
    }
}
