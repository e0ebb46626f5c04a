//! Error taxonomy shared by the IMAP and POP engines.

use thiserror::Error;

/// Errors common to both protocol engines.
///
/// Protocol-specific crates wrap this in their own `Error` enum (adding a
/// `Parse { position, message }` variant for tokeniser-local failures)
/// rather than re-declaring these rows.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown error, or one not worth a dedicated variant.
    #[error("{0}")]
    Generic(String),

    /// Could not connect, or TLS is not available where required.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The operation requires an open connection.
    #[error("not connected")]
    ServiceNotConnected,

    /// AUTH/LOGIN/APOP was rejected, or no usable mechanism exists.
    #[error("authentication failed: {0}")]
    ServiceCantAuthenticate(String),

    /// The server sent something that doesn't match the expected grammar
    /// for the engine's current state.
    #[error("protocol error: {0}")]
    ServiceProtocolError(String),

    /// `get_folder` was called on a path the caller required to exist.
    #[error("no such folder: {0}")]
    StoreNoSuchFolder(String),

    /// SELECT/CREATE/RENAME/DELETE/COPY/MOVE was refused by the server, or
    /// attempted on `""`/`INBOX` where that is illegal.
    #[error("illegal folder name: {0}")]
    FolderIllegalName(String),

    /// The referenced UID is not present in the folder.
    #[error("no such message: {0}")]
    FolderNoSuchMessage(String),

    /// A mutation was attempted on a folder selected read-only.
    #[error("folder is read-only")]
    FolderReadOnly,

    /// Transport rejected a message sender address.
    #[error("invalid sender: {0}")]
    TransportInvalidSender(String),

    /// Transport rejected a message recipient address.
    #[error("invalid recipient: {0}")]
    TransportInvalidRecipient(String),

    /// Transport was given a message with no recipients.
    #[error("no recipients")]
    TransportNoRecipients,

    /// Underlying I/O error, passed through verbatim.
    #[error(transparent)]
    System(#[from] std::io::Error),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True if this error should drive the engine back to `Disconnected`
    /// (triggering reconnect on the next `iterate`), per spec.md §7.
    #[must_use]
    pub fn is_disconnecting(&self) -> bool {
        matches!(
            self,
            Error::ServiceProtocolError(_) | Error::ServiceNotConnected | Error::System(_)
        )
    }
}
