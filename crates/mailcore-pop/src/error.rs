//! Error types for the POP3 engine.

use thiserror::Error;

/// Errors that can occur during POP3 operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Falls through to the shared taxonomy (spec.md §7): connection,
    /// authentication, folder, and transport errors.
    #[error(transparent)]
    Core(#[from] mailcore::Error),

    /// Line/data-stream grammar error (greeting, CAPA line, or a
    /// malformed response status word).
    #[error("protocol error at position {position}: {message}")]
    Parse {
        /// Byte position within the current line buffer where parsing
        /// failed.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Server sent a tagged `-ERR` response to a queued command.
    #[error("server returned -ERR: {0}")]
    Err(String),
}

impl Error {
    /// Convenience constructor for a stream/line-grammar failure.
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
