//! Pluggable stream establishment.
//!
//! A [`Transport`] knows how to turn an [`Endpoint`] into a connected
//! [`DuplexStream`] within an establish deadline: a plain socket connect for
//! [`TcpTransport`], socket connect plus TLS handshake for
//! [`tls::TlsTransport`], an in-memory pipe in tests.
//!
//! Streams take `&self` everywhere because one handle is shared between the
//! reader thread and the writing caller. Implementations must allow a `read`
//! blocked in one thread to be unblocked by `close_read` or `close` from
//! another.

use std::{io, time::Duration};

use crate::config::Endpoint;

pub mod tcp;
#[cfg(feature = "tls")]
pub mod tls;

pub use tcp::{TcpLink, TcpTransport};

/// Establishes connected streams.
pub trait Transport: Send + 'static {
    /// Stream type produced by this transport.
    type Stream: DuplexStream;

    /// Connect to `endpoint`, completing any handshake within `timeout`.
    fn establish(&self, endpoint: &Endpoint, timeout: Duration) -> io::Result<Self::Stream>;
}

/// Connected duplex byte stream.
pub trait DuplexStream: Send + Sync + 'static {
    /// Read available bytes.
    ///
    /// Returns `Ok(0)` at end of stream and an error of kind `WouldBlock` or
    /// `TimedOut` when the read timeout elapses without data.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole buffer.
    fn write_all(&self, buf: &[u8]) -> io::Result<()>;

    /// Push buffered bytes to the peer.
    fn flush(&self) -> io::Result<()>;

    /// Bound every subsequent `read`.
    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()>;

    /// Stop reading; wakes a blocked `read`.
    fn close_read(&self) -> io::Result<()>;

    /// Stop writing.
    fn close_write(&self) -> io::Result<()>;

    /// Release the underlying connection.
    fn close(&self) -> io::Result<()>;
}

/// Whether `err` is a read timeout rather than a failure.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
