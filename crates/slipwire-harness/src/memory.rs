//! In-memory transport with fault injection.
//!
//! [`MemoryTransport`] plays the gateway. Each successful `establish` creates a
//! fresh [`MemoryStream`]; whatever the client writes is handed to the
//! [`Responder`] and the reply is queued for the client's reader thread.
//!
//! Faults live on the transport and apply to every stream it creates, so a
//! test can flip them between calls without chasing stream handles. Streams
//! can also be driven individually (inject bytes, fail the next read, hang
//! up) through [`MemoryTransport::last_stream`].

use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use parking_lot::{Condvar, Mutex};
use slipwire_core::{DuplexStream, Endpoint, Transport};
use tracing::debug;

use crate::responder::Responder;

/// Switchable failure modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// Refuse this many upcoming connects
    pub refuse_connects: u32,
    /// Refuse every connect
    pub refuse_all: bool,
    /// Writes fail with `BrokenPipe`
    pub fail_writes: bool,
    /// `close` reports an error (the stream is released anyway)
    pub fail_close: bool,
    /// Reads ignore `close_read` and block until [`MemoryStream::unstick`]
    pub stuck_reads: bool,
}

#[derive(Debug)]
struct Gateway {
    responder: Mutex<Responder>,
    faults: Mutex<Faults>,
    attempts: AtomicU32,
    streams: Mutex<Vec<MemoryStream>>,
}

/// In-memory transport.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    gateway: Arc<Gateway>,
}

impl MemoryTransport {
    /// Gateway answering with `responder`.
    pub fn new(responder: Responder) -> Self {
        Self {
            gateway: Arc::new(Gateway {
                responder: Mutex::new(responder),
                faults: Mutex::new(Faults::default()),
                attempts: AtomicU32::new(0),
                streams: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Replace the gateway behaviour.
    pub fn set_responder(&self, responder: Responder) {
        *self.gateway.responder.lock() = responder;
    }

    /// Replace every fault setting.
    pub fn set_faults(&self, faults: Faults) {
        *self.gateway.faults.lock() = faults;
    }

    /// Adjust fault settings in place.
    pub fn update_faults(&self, update: impl FnOnce(&mut Faults)) {
        update(&mut self.gateway.faults.lock());
    }

    /// Connect attempts so far, refused ones included.
    pub fn connect_attempts(&self) -> u32 {
        self.gateway.attempts.load(Ordering::Acquire)
    }

    /// Streams handed out so far.
    pub fn connections(&self) -> usize {
        self.gateway.streams.lock().len()
    }

    /// Every stream handed out so far, oldest first.
    pub fn streams(&self) -> Vec<MemoryStream> {
        self.gateway.streams.lock().clone()
    }

    /// Most recently established stream.
    pub fn last_stream(&self) -> Option<MemoryStream> {
        self.gateway.streams.lock().last().cloned()
    }
}

impl Transport for MemoryTransport {
    type Stream = MemoryStream;

    fn establish(&self, endpoint: &Endpoint, _timeout: Duration) -> io::Result<MemoryStream> {
        self.gateway.attempts.fetch_add(1, Ordering::AcqRel);

        {
            let mut faults = self.gateway.faults.lock();
            if faults.refuse_all {
                return Err(io::ErrorKind::ConnectionRefused.into());
            }
            if faults.refuse_connects > 0 {
                faults.refuse_connects -= 1;
                return Err(io::ErrorKind::ConnectionRefused.into());
            }
        }

        let stream = MemoryStream::new(Arc::clone(&self.gateway));
        self.gateway.streams.lock().push(stream.clone());
        debug!(%endpoint, "memory stream established");
        Ok(stream)
    }
}

#[derive(Debug, Default)]
struct Inbound {
    bytes: VecDeque<u8>,
    read_closed: bool,
    unstuck: bool,
    failure: Option<io::ErrorKind>,
}

#[derive(Debug)]
struct Pipe {
    inbound: Mutex<Inbound>,
    arrived: Condvar,
    written: Mutex<Vec<u8>>,
    read_timeout: Mutex<Duration>,
    closed: AtomicBool,
    write_closed: AtomicBool,
}

/// Client end of an in-memory connection.
///
/// Cloning gives another handle to the same connection.
#[derive(Clone)]
pub struct MemoryStream {
    pipe: Arc<Pipe>,
    gateway: Arc<Gateway>,
}

impl std::fmt::Debug for MemoryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The gateway lists its streams; printing it here would recurse
        f.debug_struct("MemoryStream").field("pipe", &self.pipe).finish_non_exhaustive()
    }
}

impl MemoryStream {
    fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            pipe: Arc::new(Pipe {
                inbound: Mutex::new(Inbound::default()),
                arrived: Condvar::new(),
                written: Mutex::new(Vec::new()),
                read_timeout: Mutex::new(Duration::from_millis(50)),
                closed: AtomicBool::new(false),
                write_closed: AtomicBool::new(false),
            }),
            gateway,
        }
    }

    fn faults(&self) -> Faults {
        *self.gateway.faults.lock()
    }

    /// Queue bytes for the client as if the gateway sent them unprompted.
    pub fn inject(&self, bytes: &[u8]) {
        self.pipe.inbound.lock().bytes.extend(bytes);
        self.pipe.arrived.notify_all();
    }

    /// Make the next read fail with `kind`.
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.pipe.inbound.lock().failure = Some(kind);
        self.pipe.arrived.notify_all();
    }

    /// Gateway hangs up: reads report end of stream from now on.
    pub fn hang_up(&self) {
        self.pipe.inbound.lock().read_closed = true;
        self.pipe.arrived.notify_all();
    }

    /// Release a read blocked by [`Faults::stuck_reads`].
    pub fn unstick(&self) {
        self.pipe.inbound.lock().unstuck = true;
        self.pipe.arrived.notify_all();
    }

    /// Everything the client wrote.
    pub fn written(&self) -> Vec<u8> {
        self.pipe.written.lock().clone()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.pipe.closed.load(Ordering::Acquire)
    }

    /// Whether `close_write` was called.
    pub fn is_write_closed(&self) -> bool {
        self.pipe.write_closed.load(Ordering::Acquire)
    }

    /// Whether `close_read` was called or the gateway hung up.
    pub fn is_read_closed(&self) -> bool {
        self.pipe.inbound.lock().read_closed
    }
}

impl DuplexStream for MemoryStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = *self.pipe.read_timeout.lock();
        let mut inbound = self.pipe.inbound.lock();

        if self.faults().stuck_reads {
            while !inbound.unstuck {
                self.pipe.arrived.wait(&mut inbound);
            }
        }

        if let Some(kind) = inbound.failure.take() {
            return Err(kind.into());
        }
        if inbound.read_closed {
            return Ok(0);
        }
        if inbound.bytes.is_empty() {
            self.pipe.arrived.wait_for(&mut inbound, timeout);
        }
        if let Some(kind) = inbound.failure.take() {
            return Err(kind.into());
        }
        if inbound.read_closed {
            return Ok(0);
        }
        if inbound.bytes.is_empty() {
            return Err(io::ErrorKind::TimedOut.into());
        }

        let n = buf.len().min(inbound.bytes.len());
        for (slot, byte) in buf.iter_mut().zip(inbound.bytes.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&self, buf: &[u8]) -> io::Result<()> {
        if self.faults().fail_writes
            || self.pipe.closed.load(Ordering::Acquire)
            || self.pipe.write_closed.load(Ordering::Acquire)
        {
            return Err(io::ErrorKind::BrokenPipe.into());
        }

        self.pipe.written.lock().extend_from_slice(buf);
        let reply = self.gateway.responder.lock().respond(buf);
        if !reply.is_empty() {
            self.inject(&reply);
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        *self.pipe.read_timeout.lock() = timeout;
        Ok(())
    }

    fn close_read(&self) -> io::Result<()> {
        self.pipe.inbound.lock().read_closed = true;
        self.pipe.arrived.notify_all();
        Ok(())
    }

    fn close_write(&self) -> io::Result<()> {
        self.pipe.write_closed.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        self.pipe.closed.store(true, Ordering::Release);
        self.close_read()?;
        if self.faults().fail_close {
            return Err(io::Error::other("injected close failure"));
        }
        Ok(())
    }
}
