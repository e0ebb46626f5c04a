//! Component A: a cancellable byte-level I/O adapter.
//!
//! Wraps any [`std::io::Read`] + [`std::io::Write`] file-descriptor-backed
//! stream (a TCP socket, or a TLS stream layered on one) with an optional
//! cancellation descriptor. When set, reads and writes `poll(2)` on
//! `[socket, cancel_fd]` with the socket in non-blocking mode; a readable
//! cancel fd aborts the call with [`std::io::ErrorKind::Interrupted`],
//! matching spec.md §5's "cooperative, level-triggered" cancellation model.
//! The caller is responsible for draining the cancel fd afterwards.
//!
//! This is the one place in the workspace where `unsafe` appears: `poll(2)`
//! is an FFI call. Everything above this module is safe.

#![allow(unsafe_code)]

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

/// A byte stream with an optional cancellation descriptor.
pub struct CancellableStream<S> {
    inner: S,
    cancel_fd: Option<RawFd>,
    poll_timeout: Duration,
}

impl<S> CancellableStream<S>
where
    S: Read + Write + AsRawFd,
{
    /// Wraps `inner` with no cancellation source.
    pub fn new(inner: S) -> Self {
        CancellableStream {
            inner,
            cancel_fd: None,
            poll_timeout: Duration::from_millis(250),
        }
    }

    /// Sets the file descriptor that, when readable, cancels in-flight
    /// reads/writes.
    pub fn with_cancel_fd(mut self, fd: RawFd) -> Self {
        self.cancel_fd = Some(fd);
        self
    }

    /// Access to the wrapped stream, e.g. to layer TLS on top.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwraps back to the underlying stream.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn wait_readable(&self) -> io::Result<()> {
        self.poll(libc::POLLIN)
    }

    fn wait_writable(&self) -> io::Result<()> {
        self.poll(libc::POLLOUT)
    }

    fn poll(&self, events: i16) -> io::Result<()> {
        let Some(cancel_fd) = self.cancel_fd else {
            return Ok(());
        };
        let socket_fd = self.inner.as_raw_fd();
        let mut fds = [
            libc::pollfd {
                fd: socket_fd,
                events,
                revents: 0,
            },
            libc::pollfd {
                fd: cancel_fd,
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let timeout_ms = i32::try_from(self.poll_timeout.as_millis()).unwrap_or(i32::MAX);
        loop {
            // SAFETY: `fds` is a valid, correctly-sized array for the
            // duration of the call; `poll` does not retain the pointer.
            let rv = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
            if rv < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            if fds[1].revents & libc::POLLIN != 0 {
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            if rv == 0 {
                // Poll timeout with no cancellation: keep waiting for the
                // caller's actual event. This keeps the loop responsive to
                // cancellation without a data-available guarantee from a
                // single poll() call.
                continue;
            }
            if fds[0].revents & events != 0 {
                return Ok(());
            }
            if fds[0].revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                return Ok(()); // let the actual read/write surface the error
            }
        }
    }
}

impl<S> Read for CancellableStream<S>
where
    S: Read + Write + AsRawFd,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.wait_readable()?;
        self.inner.read(buf)
    }
}

impl<S> Write for CancellableStream<S>
where
    S: Read + Write + AsRawFd,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.wait_writable()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes the entire buffer, looping over partial writes exactly like
/// `spruce_tcp_stream_write`'s retry-on-short-write loop.
pub fn write_all_cancellable<W: Write>(w: &mut W, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match w.write(buf) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::os::fd::{AsRawFd as _, RawFd};

    // A Cursor has no real fd; exercise the no-cancel-fd path only, which
    // skips poll() entirely.
    struct FakeFdStream(Cursor<Vec<u8>>);

    impl Read for FakeFdStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }
    impl Write for FakeFdStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
    impl AsRawFd for FakeFdStream {
        fn as_raw_fd(&self) -> RawFd {
            // stdin; never polled because cancel_fd is unset in this test.
            0
        }
    }

    #[test]
    fn passthrough_without_cancel_fd() {
        let mut s = CancellableStream::new(FakeFdStream(Cursor::new(b"hello".to_vec())));
        let mut buf = [0u8; 5];
        assert_eq!(s.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn write_all_cancellable_handles_short_writes() {
        struct Slow(Vec<u8>);
        impl Write for Slow {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                let n = buf.len().min(2);
                self.0.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut w = Slow(Vec::new());
        write_all_cancellable(&mut w, b"abcdef").unwrap();
        assert_eq!(w.0, b"abcdef");
    }
}
