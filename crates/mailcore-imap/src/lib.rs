//! # mailcore-imap
//!
//! A blocking IMAP client engine implementing RFC 3501 (`IMAP4rev1`), with
//! LITERAL+ (RFC 2088), NAMESPACE (RFC 2342), UIDPLUS (RFC 4315) and
//! UNSELECT (RFC 3691) support.
//!
//! ## Features
//!
//! - **A single-threaded command queue**: [`Engine`] serializes commands
//!   FIFO and steps the connection one response at a time via
//!   [`Engine::iterate`] — no pipelining, no async runtime
//! - **Full protocol support**: LOGIN, SELECT, FETCH, STORE, COPY, MOVE,
//!   SEARCH, APPEND, EXPUNGE, and more
//! - **TLS via rustls**: Secure connections without OpenSSL dependency
//! - **Folder operations**: [`folder::Folder`] layers open/close/create/
//!   delete/rename/expunge/append/copy/move/list on top of the engine
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailcore_imap::{Engine, Command, connection::connect_tls};
//!
//! let stream = connect_tls("imap.example.com", 993)?;
//! let mut engine = Engine::new(stream);
//!
//! let id = engine.queue(Command::Login {
//!     username: "user@example.com".to_string(),
//!     password: "password".to_string(),
//! }, None);
//!
//! loop {
//!     let done = engine.iterate(|| Err(mailcore_imap::Error::No("no reconnect hook".into())))?;
//!     if done == id {
//!         let completed = engine.take_result(id).unwrap();
//!         assert!(completed.result.is_ok());
//!         break;
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: IMAP command builders and types
//! - [`connection`]: Stream configuration and plaintext/TLS transport
//! - [`engine`]: The blocking command queue and response dispatcher
//! - [`folder`]: Folder-level operations built on the engine
//! - [`parser`]: Sans-I/O response parser
//! - [`types`]: Core IMAP types (flags, mailboxes, sequences, etc.)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod engine;
mod error;
pub mod folder;
pub mod mutf7;
pub mod parser;
pub mod summary;
pub mod types;

pub use command::{Command, FetchAttribute, FetchItems, SearchCriteria, StoreAction, TagGenerator};
pub use connection::{Config, ConfigBuilder, ImapStream, Security};
pub use engine::{CommandResult, CompletedCommand, Engine, EngineState};
pub use error::{Error, Result};
pub use folder::{Folder, FolderChange};
pub use parser::{Response, ResponseParser, UntaggedResponse};
pub use types::{
    Capability, Flag, Flags, ListResponse, Mailbox, MailboxAttribute, MailboxStatus, ResponseCode,
    SeqNum, SequenceSet, Status, Tag, Uid, UidSet, UidValidity,
};

/// IMAP protocol version supported.
pub const IMAP_VERSION: &str = "IMAP4rev2";
