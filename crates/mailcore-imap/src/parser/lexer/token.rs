//! The token alphabet produced by [`super::TokenStream`].

/// One lexical token of an IMAP response or command.
///
/// Unlike a full-slice lexer, a streaming tokeniser cannot hand back a
/// borrow of its internal ring buffer across calls (the buffer gets
/// shifted or overwritten by the next read). Text-bearing variants own
/// their bytes; the one-token pushback slot in [`super::TokenStream`]
/// stores this owned form directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// No data is available yet and the peer has disconnected; there is
    /// nothing further to read.
    NoData,
    /// A tokeniser-level error (bad literal size, unterminated quoted
    /// string at EOF, digit run that overflowed both `u32` and `u64`).
    Error(String),
    /// The atom `NIL`, case-insensitively.
    Nil,
    /// A bare atom (`OK`, `UIDNEXT`, `101:105` after colon/comma
    /// reinterpretation, ...).
    Atom(String),
    /// A double-quoted string with `\"`/`\\` escapes already resolved.
    QString(String),
    /// A `{n}` or `{n+}` literal announcement; the literal's `n` bytes of
    /// raw body immediately follow in the stream and are read separately
    /// via [`super::TokenStream::read_literal`].
    Literal(u32),
    /// A `\`-prefixed flag atom (`\Seen`, `\*`), without the backslash.
    Flag(String),
    /// A decimal number that fits in 32 bits.
    Number(u32),
    /// A decimal number too large for `u32` but fitting in `u64`
    /// (64-bit `MODSEQ` values).
    Number64(u64),
    /// A single-character special: `( ) [ ] * +` or the bare `\n` of a
    /// line ending.
    Char(u8),
}

impl Token {
    /// True if this is the single-character special `c`.
    #[must_use]
    pub fn is_char(&self, c: u8) -> bool {
        matches!(self, Token::Char(b) if *b == c)
    }
}
