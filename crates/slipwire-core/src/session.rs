//! Stream session lifecycle.
//!
//! A [`StreamSession`] owns at most one connected stream and the background
//! [`Reader`] bound to it. It moves through three states:
//!
//! ```text
//!   Disconnected ──connect──► Connecting ──reader running──► Ready
//!        ▲                         │                           │
//!        └────────── failure ──────┘◄──────── close ───────────┘
//! ```
//!
//! Transitions only happen in [`StreamSession::connect`] and
//! [`StreamSession::close`]. A failed [`StreamSession::send`] closes the
//! session before returning the error, so a half-open stream is never left
//! reachable.

use std::{sync::Arc, time::Duration};

use slipwire_proto::Frame;
use tracing::{debug, info, warn};

use crate::{
    config::{Endpoint, TransportConfig},
    error::TransportError,
    monitor::LinkMonitor,
    queue::FrameQueue,
    reader::{Reader, ReaderSettings},
    transport::{DuplexStream, Transport},
};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No stream
    #[default]
    Disconnected,
    /// Establishing the stream and starting the reader
    Connecting,
    /// Stream connected and reader running
    Ready,
}

impl SessionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Ready,
            _ => Self::Disconnected,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Ready => 2,
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Read timeout once the stream is established
    pub steady_state_timeout: Duration,
    /// Frame queue capacity
    pub queue_capacity: usize,
    /// Reader settings
    pub reader: ReaderSettings,
}

impl From<&TransportConfig> for SessionSettings {
    fn from(config: &TransportConfig) -> Self {
        Self {
            steady_state_timeout: config.steady_state_timeout(),
            queue_capacity: config.queue_capacity,
            reader: ReaderSettings {
                frame_capacity: config.max_frame_length,
                stop_timeout: config.stop_timeout(),
            },
        }
    }
}

/// Connected stream and its reader.
struct Link<S: DuplexStream> {
    stream: Arc<S>,
    reader: Reader<S>,
}

/// One stream session over a pluggable transport.
pub struct StreamSession<T: Transport> {
    transport: T,
    settings: SessionSettings,
    monitor: Arc<LinkMonitor>,
    state: SessionState,
    link: Option<Link<T::Stream>>,
}

impl<T: Transport> StreamSession<T> {
    /// Disconnected session.
    pub fn new(transport: T, settings: SessionSettings, monitor: Arc<LinkMonitor>) -> Self {
        monitor.set_state(SessionState::Disconnected);
        Self { transport, settings, monitor, state: SessionState::Disconnected, link: None }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the stream is connected and the reader running.
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Establish the stream and start the reader.
    ///
    /// `establish_timeout` bounds the connect and any handshake; afterwards
    /// reads switch to the steady-state timeout. No-op if already ready. On
    /// failure everything acquired so far is released and the session is
    /// back to `Disconnected`.
    pub fn connect(
        &mut self,
        endpoint: &Endpoint,
        establish_timeout: Duration,
    ) -> Result<(), TransportError> {
        if self.is_ready() {
            return Ok(());
        }
        if self.link.is_some() {
            self.close_quietly();
        }

        self.set_state(SessionState::Connecting);
        debug!(%endpoint, ?establish_timeout, "connecting");

        match self.open(endpoint, establish_timeout) {
            Ok(link) => {
                self.monitor.attach_queue(link.reader.queue());
                self.link = Some(link);
                self.set_state(SessionState::Ready);
                self.monitor.record_connect();
                info!(%endpoint, "session ready");
                Ok(())
            },
            Err(err) => {
                warn!(%endpoint, error = %err, "connect failed");
                self.set_state(SessionState::Disconnected);
                Err(err)
            },
        }
    }

    fn open(
        &self,
        endpoint: &Endpoint,
        establish_timeout: Duration,
    ) -> Result<Link<T::Stream>, TransportError> {
        let stream = self
            .transport
            .establish(endpoint, establish_timeout)
            .map_err(|source| TransportError::Connect { endpoint: endpoint.clone(), source })?;
        let stream = Arc::new(stream);

        if let Err(err) = stream.set_read_timeout(self.settings.steady_state_timeout) {
            release(&*stream);
            return Err(err.into());
        }

        let queue = Arc::new(FrameQueue::new(self.settings.queue_capacity));
        let mut reader = Reader::new(
            Arc::clone(&stream),
            queue,
            Arc::clone(&self.monitor),
            self.settings.reader,
        );
        if let Err(err) = reader.start() {
            release(&*stream);
            return Err(err);
        }

        Ok(Link { stream, reader })
    }

    /// Write `bytes` and flush.
    ///
    /// A write or flush failure closes the session before the error is
    /// returned.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;

        let written = link.stream.write_all(bytes).and_then(|()| link.stream.flush());
        if let Err(err) = written {
            warn!(error = %err, len = bytes.len(), "send failed, closing session");
            self.close_quietly();
            return Err(err.into());
        }

        debug!(len = bytes.len(), "sent");
        Ok(())
    }

    /// Whether a frame is waiting to be received.
    pub fn available(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.reader.available() > 0)
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// `Ok(None)` means nothing arrived in time.
    pub fn receive(&self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        link.reader.take(timeout)
    }

    /// Discard every frame received but not yet taken.
    pub fn flush(&self) -> usize {
        self.link.as_ref().map_or(0, |link| link.reader.flush())
    }

    /// Tear the session down.
    ///
    /// Stops the reader, then closes the write side, then the connection,
    /// continuing past each failure. Always ends `Disconnected`. Idempotent.
    /// Returns the first failure encountered, after everything was released.
    pub fn close(&mut self) -> Result<(), TransportError> {
        let Some(mut link) = self.link.take() else {
            self.set_state(SessionState::Disconnected);
            return Ok(());
        };

        self.monitor.detach_queue();
        let mut first: Option<TransportError> = None;

        if let Err(err) = link.reader.stop() {
            warn!(error = %err, "stopping reader failed");
            first.get_or_insert(err);
        }
        if let Err(err) = link.stream.close_write() {
            debug!(error = %err, "closing write side failed");
            first.get_or_insert(err.into());
        }
        if let Err(err) = link.stream.close() {
            warn!(error = %err, "closing stream failed");
            first.get_or_insert(err.into());
        }

        self.set_state(SessionState::Disconnected);
        debug!("session closed");

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// [`StreamSession::close`], logging instead of returning failures.
    pub fn close_quietly(&mut self) {
        if let Err(err) = self.close() {
            debug!(error = %err, "session closed with errors");
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.monitor.set_state(state);
    }
}

impl<T: Transport> Drop for StreamSession<T> {
    fn drop(&mut self) {
        self.close_quietly();
    }
}

fn release<S: DuplexStream>(stream: &S) {
    if let Err(err) = stream.close() {
        debug!(error = %err, "releasing stream failed");
    }
}
