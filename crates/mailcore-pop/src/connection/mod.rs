//! POP3 connection management.
//!
//! This module provides connection handling for POP3 servers:
//! - Configuration (host, port, security mode)
//! - A blocking plaintext/TLS stream abstraction, cancellable via
//!   [`mailcore::io::CancellableStream`] and handed to [`crate::engine::Engine`]

mod config;
mod stream;

pub use config::{Config, ConfigBuilder, Security};
pub use stream::{PopStream, connect_plain, connect_tls};
