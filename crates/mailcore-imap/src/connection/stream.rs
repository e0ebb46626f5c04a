//! Synchronous plain/TLS stream, wrapped in [`mailcore::io::CancellableStream`]
//! so the engine's blocking reads/writes honour component A's cancellation
//! model instead of needing an async runtime.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use mailcore::io::CancellableStream;
use mailcore::Error as CoreError;

use crate::Result;

/// A stream that is either plaintext or TLS, with a uniform `Read`/`Write`
/// surface so the engine doesn't care which.
pub enum ImapStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed; `rustls::StreamOwned` is large).
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
}

impl ImapStream {
    /// True if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Upgrades a plaintext stream to TLS in place (STARTTLS).
    ///
    /// # Errors
    /// Returns an error if TLS setup or the handshake fails.
    pub fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let conn = tls_connection(host)?;
                let stream = rustls::StreamOwned::new(conn, tcp);
                Ok(Self::Tls(Box::new(stream)))
            }
            Self::Tls(_) => Err(CoreError::ServiceProtocolError(
                "STARTTLS on an already-encrypted connection".to_string(),
            )
            .into()),
        }
    }
}

impl Read for ImapStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }
}

impl Write for ImapStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(s) => s.flush(),
            Self::Tls(s) => s.flush(),
        }
    }
}

impl AsRawFd for ImapStream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Plain(s) => s.as_raw_fd(),
            Self::Tls(s) => s.sock.as_raw_fd(),
        }
    }
}

fn tls_connection(host: &str) -> Result<rustls::ClientConnection> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|e| CoreError::ServiceUnavailable(format!("invalid server name {host}: {e}")))?;
    rustls::ClientConnection::new(Arc::new(config), server_name)
        .map_err(|e| CoreError::ServiceUnavailable(format!("tls setup failed: {e}")).into())
}

/// Connects to `host:port` with TLS from the first byte, returning a
/// cancellable stream ready for the engine.
///
/// # Errors
/// Returns an error if the TCP connection or TLS handshake fails.
pub fn connect_tls(host: &str, port: u16) -> Result<CancellableStream<ImapStream>> {
    let tcp = TcpStream::connect((host, port)).map_err(CoreError::from)?;
    let conn = tls_connection(host)?;
    let stream = ImapStream::Tls(Box::new(rustls::StreamOwned::new(conn, tcp)));
    Ok(CancellableStream::new(stream))
}

/// Connects to `host:port` in plaintext (for `STARTTLS` negotiation or
/// local testing).
///
/// # Errors
/// Returns an error if the TCP connection fails.
pub fn connect_plain(host: &str, port: u16) -> Result<CancellableStream<ImapStream>> {
    let tcp = TcpStream::connect((host, port)).map_err(CoreError::from)?;
    Ok(CancellableStream::new(ImapStream::Plain(tcp)))
}
