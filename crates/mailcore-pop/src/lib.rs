//! # mailcore-pop
//!
//! A blocking POP3 client engine implementing RFC 1939, the `CAPA`
//! extension (RFC 2449), and `STLS` (RFC 2595).
//!
//! ## Features
//!
//! - **A single-command-at-a-time queue**: [`Engine`] drives one command
//!   to completion via [`Engine::iterate`] before the next is written —
//!   POP3 has no pipelining to speak of without the `PIPELINING`
//!   capability, and this engine doesn't assume it
//! - **The greeting/CAPA/AUTH state machine**: `Connect -> Auth ->
//!   Transaction -> Update`, with APOP-timestamp and capability-table
//!   parsing handled on connect
//! - **TLS via rustls**, upgraded in place after `STLS`
//! - **Maildrop operations**: [`folder::Folder`] layers UID discovery
//!   (`UIDL`, falling back to `LIST`), deferred deletion, and message
//!   retrieval on top of the engine
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailcore_pop::{Engine, Command, connection::connect_tls};
//!
//! let stream = connect_tls("pop.example.com", 995)?;
//! let mut engine = Engine::new(stream)?;
//!
//! let id = engine.queue(Command::User("user@example.com".to_string()));
//! loop {
//!     let done = engine.iterate(|| Err(mailcore_pop::Error::Err("no reconnect hook".into())))?;
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
//! - [`command`]: POP3 commands and the `CAPA` capability table
//! - [`connection`]: Stream configuration and plaintext/TLS transport
//! - [`engine`]: The blocking single-command queue and status-line
//!   classifier
//! - [`folder`]: Maildrop-level operations built on the engine
//! - [`stream`]: The line / multi-line data stream
//! - [`summary`]: The POP alias of the shared folder-summary cache

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod engine;
mod error;
pub mod folder;
pub mod stream;
pub mod summary;

pub use command::{Capability, Command};
pub use connection::{Config, ConfigBuilder, PopStream, Security};
pub use engine::{CommandResult, CompletedCommand, Engine, EngineState};
pub use error::{Error, Result};
pub use folder::Folder;
pub use stream::PopLineStream;
pub use summary::FolderSummary;

/// POP3 extensions this engine negotiates.
pub const POP_EXTENSIONS: &str = "CAPA, STLS, UIDL, TOP";
