//! Error types for the IMAP engine.

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Falls through to the shared taxonomy (spec.md §7): connection,
    /// authentication, folder, and transport errors.
    #[error(transparent)]
    Core(#[from] mailcore::Error),

    /// Tokeniser or response-grammar error at a given byte offset.
    #[error("protocol error at position {position}: {message}")]
    Parse {
        /// Byte position within the current buffer where parsing failed.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// A second consecutive call to `unget_token` without an intervening
    /// `next_token` (component B only ever buffers one token).
    #[error("token stream pushback slot already occupied")]
    DoublePushback,

    /// Server sent a tagged `NO` response to a queued command.
    #[error("server returned NO: {0}")]
    No(String),

    /// Server sent a tagged `BAD` response to a queued command.
    #[error("server returned BAD: {0}")]
    Bad(String),
}

impl Error {
    /// Convenience constructor for a tokeniser/parse failure.
    #[must_use]
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
        }
    }
}

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
