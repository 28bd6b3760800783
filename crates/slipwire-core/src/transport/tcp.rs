//! Plain TCP transport.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use tracing::debug;

use super::{DuplexStream, Transport};
use crate::config::Endpoint;

/// Transport over an unencrypted TCP connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    type Stream = TcpLink;

    fn establish(&self, endpoint: &Endpoint, timeout: Duration) -> io::Result<TcpLink> {
        connect(endpoint, timeout).map(|stream| TcpLink { stream })
    }
}

/// Connect to the first resolved address that accepts within `timeout`.
///
/// The returned socket has read and write timeouts set to `timeout` so that a
/// handshake running on top of it is bounded too.
pub(crate) fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_error = None;

    for addr in (endpoint.host.as_str(), endpoint.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                debug!(%endpoint, %addr, "tcp connected");
                return Ok(stream);
            },
            Err(err) => {
                debug!(%endpoint, %addr, error = %err, "tcp connect failed");
                last_error = Some(err);
            },
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, format!("{endpoint} did not resolve"))
    }))
}

/// Connected TCP stream.
#[derive(Debug)]
pub struct TcpLink {
    stream: TcpStream,
}

impl DuplexStream for TcpLink {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        (&self.stream).write_all(buf)
    }

    fn flush(&self) -> io::Result<()> {
        (&self.stream).flush()
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))
    }

    fn close_read(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Read)
    }

    fn close_write(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Write)
    }

    fn close(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}
