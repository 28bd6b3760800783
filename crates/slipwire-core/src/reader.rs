//! Background reader.
//!
//! Owns one thread per connected session. The thread reads chunks from the
//! stream, runs them through a [`Framer`] and pushes complete frames into the
//! session's [`FrameQueue`].
//!
//! # Read loop
//!
//! - Read timeout: expected, loop again
//! - End of stream: treated as transient, pause briefly and loop again
//! - Any other error: record it, close the queue and exit
//!
//! # Shutdown
//!
//! [`Reader::stop`] sets a cancellation flag and closes the stream's read side
//! so a blocked read returns immediately, then waits (bounded) for the thread
//! to exit. A thread that does not exit in time is detached and reported as
//! [`TransportError::StopTimeout`]; the caller is never blocked forever.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use slipwire_proto::{Frame, Framer, FramerEvent};
use tracing::{debug, error, trace, warn};

use crate::{
    error::TransportError,
    monitor::LinkMonitor,
    queue::{FrameQueue, Pop},
    transport::{DuplexStream, is_timeout},
};

/// Bytes requested per read.
const READ_CHUNK: usize = 1024;

/// Pause after an end-of-stream read before trying again.
const EOF_PAUSE: Duration = Duration::from_millis(50);

/// Reader settings.
#[derive(Debug, Clone, Copy)]
pub struct ReaderSettings {
    /// Partial-frame buffer capacity
    pub frame_capacity: usize,
    /// Bounded wait in [`Reader::stop`]
    pub stop_timeout: Duration,
}

/// State shared between the reader thread and its owner.
#[derive(Debug, Default)]
struct Shared {
    cancel: AtomicBool,
    failure: Mutex<Option<io::Error>>,
    exited: Mutex<bool>,
    exited_cv: Condvar,
}

impl Shared {
    fn mark_exited(&self) {
        *self.exited.lock() = true;
        self.exited_cv.notify_all();
    }

    fn wait_exited(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut exited = self.exited.lock();
        while !*exited {
            match deadline {
                Some(deadline) => {
                    if self.exited_cv.wait_until(&mut exited, deadline).timed_out() {
                        return *exited;
                    }
                },
                None => self.exited_cv.wait(&mut exited),
            }
        }
        true
    }
}

/// Handle to the background reader of one session.
pub struct Reader<S: DuplexStream> {
    stream: Arc<S>,
    queue: Arc<FrameQueue>,
    monitor: Arc<LinkMonitor>,
    settings: ReaderSettings,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    stopped: bool,
}

impl<S: DuplexStream> Reader<S> {
    /// Reader over `stream`, delivering into `queue`. Not started yet.
    pub fn new(
        stream: Arc<S>,
        queue: Arc<FrameQueue>,
        monitor: Arc<LinkMonitor>,
        settings: ReaderSettings,
    ) -> Self {
        Self {
            stream,
            queue,
            monitor,
            settings,
            shared: Arc::new(Shared::default()),
            handle: None,
            stopped: false,
        }
    }

    /// Spawn the reader thread. A second call while running is a no-op.
    ///
    /// A stopped reader cannot be restarted; sessions create a new one per
    /// connection.
    pub fn start(&mut self) -> Result<(), TransportError> {
        if self.stopped {
            return Err(TransportError::ReaderStopped);
        }
        if self.handle.is_some() {
            return Ok(());
        }

        let stream = Arc::clone(&self.stream);
        let queue = Arc::clone(&self.queue);
        let monitor = Arc::clone(&self.monitor);
        let shared = Arc::clone(&self.shared);
        let capacity = self.settings.frame_capacity;

        let handle = thread::Builder::new()
            .name("slipwire-reader".to_string())
            .spawn(move || run(&*stream, &queue, &monitor, &shared, capacity))?;

        self.handle = Some(handle);
        debug!("reader started");
        Ok(())
    }

    /// Whether the thread was started and has not exited.
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !*self.shared.exited.lock()
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` on timeout. Once the thread has exited and the queue
    /// is drained, returns the recorded read failure, or
    /// [`TransportError::ReaderStopped`].
    pub fn take(&self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        match self.queue.pop_timeout(timeout) {
            Pop::Frame(frame) => Ok(Some(frame)),
            Pop::Empty => Ok(None),
            Pop::Closed => Err(self.take_failure().unwrap_or(TransportError::ReaderStopped)),
        }
    }

    /// Queue this reader delivers into.
    pub fn queue(&self) -> Arc<FrameQueue> {
        Arc::clone(&self.queue)
    }

    /// Frames ready to be taken.
    pub fn available(&self) -> usize {
        self.queue.len()
    }

    /// Discard every queued frame, returning how many were dropped.
    pub fn flush(&self) -> usize {
        let discarded = self.queue.clear();
        if discarded > 0 {
            debug!(discarded, "flushed queued frames");
        }
        discarded
    }

    /// Cancel the thread and wait for it to exit.
    ///
    /// Idempotent. Returns the read failure if the thread died on one that
    /// nobody observed yet, or [`TransportError::StopTimeout`] if it did not
    /// exit within the configured bound.
    pub fn stop(&mut self) -> Result<(), TransportError> {
        self.stopped = true;
        let Some(handle) = self.handle.take() else {
            self.queue.close();
            return Ok(());
        };

        self.shared.cancel.store(true, Ordering::Release);
        if let Err(err) = self.stream.close_read() {
            debug!(error = %err, "closing read side failed");
        }

        let timeout = self.settings.stop_timeout;
        if !self.shared.wait_exited(timeout) {
            // Thread is stuck in a read that ignored the close; let it go
            error!(?timeout, "reader thread did not exit, detaching");
            self.queue.close();
            return Err(TransportError::StopTimeout(timeout));
        }

        if handle.join().is_err() {
            error!("reader thread panicked");
        }
        self.queue.close();
        debug!("reader stopped");

        match self.take_failure() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn take_failure(&self) -> Option<TransportError> {
        self.shared.failure.lock().take().map(TransportError::ReaderFailed)
    }
}

impl<S: DuplexStream> Drop for Reader<S> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(err) = self.stop() {
                warn!(error = %err, "reader stop on drop failed");
            }
        }
    }
}

fn run<S: DuplexStream>(
    stream: &S,
    queue: &FrameQueue,
    monitor: &LinkMonitor,
    shared: &Shared,
    capacity: usize,
) {
    let mut framer = Framer::with_capacity(capacity);
    let mut buf = [0u8; READ_CHUNK];

    let outcome = loop {
        if shared.cancel.load(Ordering::Acquire) {
            break Ok(());
        }

        match stream.read(&mut buf) {
            Ok(0) => {
                trace!("end of stream");
                thread::sleep(EOF_PAUSE);
            },
            Ok(n) => {
                for event in framer.push(&buf[..n]) {
                    deliver(event, queue, monitor);
                }
            },
            Err(err) if is_timeout(&err) || err.kind() == io::ErrorKind::Interrupted => {},
            Err(err) => break Err(err),
        }
    };

    if let Err(err) = outcome {
        if shared.cancel.load(Ordering::Acquire) {
            debug!(error = %err, "read failed during shutdown");
        } else {
            warn!(error = %err, "reader terminated on I/O error");
            *shared.failure.lock() = Some(err);
        }
    }

    queue.close();
    shared.mark_exited();
}

fn deliver(event: FramerEvent, queue: &FrameQueue, monitor: &LinkMonitor) {
    match event {
        FramerEvent::Frame(frame) => {
            trace!(?frame, "frame received");
            monitor.record_frame();
            if let Some(evicted) = queue.push(frame) {
                monitor.record_eviction();
                debug!(?evicted, "queue full, evicted oldest frame");
            }
        },
        FramerEvent::Resync(anomaly) => {
            monitor.record_anomaly();
            debug!(%anomaly, "framing anomaly, resynchronizing");
        },
    }
}
