//! Component C: the POP3 line / multi-line data stream.
//!
//! Two modes, switched by the engine around a command's response:
//! `Line` hands back one CRLF-or-LF-terminated line at a time (status
//! words, CAPA/UIDL/LIST entries); `Data` transforms a multi-line body
//! (RETR/TOP) into a raw byte stream, undoing CRLF canonicalisation and
//! dot-stuffing and detecting the terminating `.\r\n`.
//!
//! Grounded in the same buffer-refill discipline as
//! [`crate::engine`]'s sibling in the IMAP crate
//! (`mailcore_imap::parser::lexer::TokenStream`): bytes already read off
//! the socket are kept in a growable buffer and only a blocking read
//! brings in more, so a line or data chunk spanning two reads doesn't
//! require re-entrant caller bookkeeping.

use std::io::{self, Read};

use mailcore::Error as CoreError;

use crate::error::{Error, Result};

const INITIAL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Line,
    Data,
}

/// Wraps a byte stream, yielding either whole lines or dot-unstuffed data
/// chunks depending on which mode it's in.
pub struct PopLineStream<S> {
    inner: S,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    mode: Mode,
    eod: bool,
    disconnected: bool,
}

impl<S: Read> PopLineStream<S> {
    /// Wraps `inner` in a fresh stream, starting in `Line` mode.
    pub fn new(inner: S) -> Self {
        PopLineStream {
            inner,
            buf: vec![0u8; INITIAL_CAPACITY],
            start: 0,
            end: 0,
            mode: Mode::Line,
            eod: false,
            disconnected: false,
        }
    }

    /// Gives back the underlying stream (e.g. to rewrap it in TLS after
    /// `STLS`).
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Mutable access to the underlying stream, so the engine can write
    /// commands on the same connection this stream reads responses from.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Re-synchronises the stream after a reconnect: drops any buffered,
    /// as-yet-unread bytes and resets to `Line` mode, so a fresh
    /// connection's greeting is read cleanly.
    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
        self.mode = Mode::Line;
        self.eod = false;
        self.disconnected = false;
    }

    /// Switches into `Data` mode for streaming a multi-line response body
    /// (right before the payload of RETR/TOP/LIST/UIDL). Issuing a new
    /// command implicitly clears `eod` via this call or [`Self::reset`].
    pub fn begin_data(&mut self) {
        self.mode = Mode::Data;
        self.eod = false;
    }

    /// Returns to `Line` mode (automatic on EOD, but exposed for callers
    /// that want to bail out of a data read early).
    pub fn end_data(&mut self) {
        self.mode = Mode::Line;
    }

    /// True once `Data` mode has seen the terminating `.`.
    #[must_use]
    pub const fn is_eod(&self) -> bool {
        self.eod
    }

    fn fill(&mut self) -> io::Result<usize> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        if self.end == self.buf.len() {
            self.buf.resize(self.buf.len() * 2, 0);
        }
        let n = self.inner.read(&mut self.buf[self.end..])?;
        if n == 0 {
            self.disconnected = true;
        }
        self.end += n;
        Ok(n)
    }

    fn find_newline(&self, from: usize) -> Option<usize> {
        self.buf[from..self.end].iter().position(|&b| b == b'\n').map(|i| from + i)
    }

    /// Reads the next line, CRLF-or-LF-terminated, with the terminator
    /// stripped. Blocks until a full line is buffered or the peer
    /// disconnects mid-line.
    ///
    /// # Errors
    /// Returns an error if the connection closes before a line completes.
    pub fn next_line(&mut self) -> Result<String> {
        loop {
            if let Some(nl) = self.find_newline(self.start) {
                let mut line_end = nl;
                if line_end > self.start && self.buf[line_end - 1] == b'\r' {
                    line_end -= 1;
                }
                let line = String::from_utf8_lossy(&self.buf[self.start..line_end]).into_owned();
                self.start = nl + 1;
                return Ok(line);
            }
            if self.disconnected {
                return Err(Error::Core(CoreError::ServiceProtocolError(
                    "disconnected waiting for a line".to_string(),
                )));
            }
            self.fill().map_err(core_io)?;
        }
    }

    /// Reads the next chunk of `Data`-mode body bytes. Returns an empty
    /// vec once EOD is reached (check [`Self::is_eod`] to tell that
    /// apart from a genuinely empty data line).
    ///
    /// # Errors
    /// Returns an error if the connection closes mid-body with no EOD
    /// marker seen.
    pub fn next_data_chunk(&mut self) -> Result<Vec<u8>> {
        debug_assert_eq!(self.mode, Mode::Data);
        loop {
            let Some(nl) = self.find_newline(self.start) else {
                if self.disconnected {
                    // Misterminated body: no EOD marker, peer is gone.
                    // Treat what's left as the end rather than erroring,
                    // matching the robustness requirement for bare-`\n`
                    // termination at the next level down.
                    self.eod = true;
                    self.mode = Mode::Line;
                    return Ok(Vec::new());
                }
                self.fill().map_err(core_io)?;
                continue;
            };

            let had_crlf = nl > self.start && self.buf[nl - 1] == b'\r';
            let content_end = if had_crlf { nl - 1 } else { nl };
            let is_lone_dot = content_end == self.start + 1 && self.buf[self.start] == b'.';

            if is_lone_dot {
                if had_crlf {
                    self.start = nl + 1;
                    self.eod = true;
                    self.mode = Mode::Line;
                    return Ok(Vec::new());
                }
                // Bare `\n` at a `.` line: ambiguous per spec. Peek the
                // next line once it's fully buffered and decide from its
                // head; until then, keep waiting for more bytes.
                match self.resolve_bare_dot_terminator(nl)? {
                    true => {
                        self.start = nl + 1;
                        self.eod = true;
                        self.mode = Mode::Line;
                        return Ok(Vec::new());
                    }
                    false => {
                        // Not actually EOD: a literal "." data line, sent
                        // without the dot-stuffing a conformant server
                        // would have applied. Pass it through unstuffed
                        // (empty line) and keep reading.
                        self.start = nl + 1;
                        return Ok(vec![b'\n']);
                    }
                }
            }

            let content = &self.buf[self.start..content_end];
            let unstuffed: &[u8] = if content.first() == Some(&b'.') {
                &content[1..]
            } else {
                content
            };
            let mut out = Vec::with_capacity(unstuffed.len() + 1);
            out.extend_from_slice(unstuffed);
            out.push(b'\n');
            self.start = nl + 1;
            return Ok(out);
        }
    }

    /// Peeks past a bare-`\n`-terminated `.` line to decide whether it
    /// really was EOD. Returns `true` (assume EOD) once the next line's
    /// head matches `+OK`/`-ERR` or the peer disconnects; blocks,
    /// refilling, until one of those is knowable.
    fn resolve_bare_dot_terminator(&mut self, dot_line_end: usize) -> Result<bool> {
        loop {
            if let Some(next_nl) = self.find_newline(dot_line_end + 1) {
                let next_line = &self.buf[dot_line_end + 1..next_nl];
                return Ok(next_line.starts_with(b"+OK") || next_line.starts_with(b"-ERR"));
            }
            if self.disconnected {
                return Ok(true);
            }
            self.fill().map_err(core_io)?;
        }
    }
}

fn core_io(e: io::Error) -> Error {
    Error::Core(CoreError::System(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_crlf_and_bare_lf_lines() {
        let mut s = PopLineStream::new(Cursor::new(b"+OK ready\r\nBAD\n".to_vec()));
        assert_eq!(s.next_line().unwrap(), "+OK ready");
        assert_eq!(s.next_line().unwrap(), "BAD");
    }

    #[test]
    fn data_mode_unstuffs_dots_and_detects_eod() {
        let mut s = PopLineStream::new(Cursor::new(b"hello\r\n..stuffed\r\n.\r\n".to_vec()));
        s.begin_data();
        assert_eq!(s.next_data_chunk().unwrap(), b"hello\n");
        assert_eq!(s.next_data_chunk().unwrap(), b".stuffed\n");
        let last = s.next_data_chunk().unwrap();
        assert!(last.is_empty());
        assert!(s.is_eod());
    }

    #[test]
    fn bare_lf_dot_line_followed_by_status_word_assumes_eod() {
        let mut s = PopLineStream::new(Cursor::new(b"body\r\n.\n+OK 2 messages\r\n".to_vec()));
        s.begin_data();
        assert_eq!(s.next_data_chunk().unwrap(), b"body\n");
        let last = s.next_data_chunk().unwrap();
        assert!(last.is_empty());
        assert!(s.is_eod());
        s.end_data();
        assert_eq!(s.next_line().unwrap(), "+OK 2 messages");
    }

    #[test]
    fn bare_lf_dot_line_followed_by_more_data_is_not_eod() {
        let mut s = PopLineStream::new(Cursor::new(b".\nmore data\r\n.\r\n".to_vec()));
        s.begin_data();
        let first = s.next_data_chunk().unwrap();
        assert_eq!(first, b"\n");
        assert!(!s.is_eod());
        assert_eq!(s.next_data_chunk().unwrap(), b"more data\n");
        let last = s.next_data_chunk().unwrap();
        assert!(last.is_empty());
        assert!(s.is_eod());
    }
}
