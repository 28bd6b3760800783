//! Request/response orchestrator.
//!
//! [`Client::io`] is the only way bytes reach the gateway. Each call runs a
//! small state machine per attempt:
//!
//! ```text
//!   Idle ─► Connecting ─► Sending ─► AwaitingResponse ─► Success
//!              │             │              │
//!              └─────────────┴──── error ───┴─► Backoff ─► Connecting ...
//! ```
//!
//! A failed attempt always closes the session, so the next attempt starts
//! from a fresh connection. After the configured number of attempts the last
//! error is returned wrapped in [`TransportError::RetriesExhausted`] and the
//! session is left disconnected.
//!
//! Callers are serialized on one lock: the protocol allows a single
//! outstanding request. Liveness probes ([`Client::is_alive`],
//! [`Client::is_message_available`], timestamps) read the [`LinkMonitor`]
//! and never take that lock.

use std::{sync::Arc, time::SystemTime};

use parking_lot::Mutex;
use slipwire_proto::{Frame, Packet};
use tracing::{debug, error, info, warn};

use crate::{
    config::{Endpoint, TransportConfig},
    env::{Clock, SystemClock},
    error::{ConfigError, TransportError},
    monitor::{Health, LinkMonitor, Phase},
    session::{SessionSettings, SessionState, StreamSession},
    transport::Transport,
};

/// Synchronous request/response client for one gateway.
pub struct Client<T: Transport, C: Clock = SystemClock> {
    config: TransportConfig,
    endpoint: Endpoint,
    session: Mutex<StreamSession<T>>,
    monitor: Arc<LinkMonitor>,
    clock: C,
}

impl<T: Transport> Client<T> {
    /// Client using the system clock.
    pub fn new(transport: T, config: TransportConfig) -> Result<Self, ConfigError> {
        Self::with_clock(transport, config, SystemClock)
    }
}

impl<T: Transport, C: Clock> Client<T, C> {
    /// Client using `clock` for timestamps and backoff sleeps.
    ///
    /// Nothing is connected until the first [`Client::io`].
    pub fn with_clock(transport: T, config: TransportConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;

        let monitor = Arc::new(LinkMonitor::new());
        let session =
            StreamSession::new(transport, SessionSettings::from(&config), Arc::clone(&monitor));

        Ok(Self {
            endpoint: config.endpoint(),
            config,
            session: Mutex::new(session),
            monitor,
            clock,
        })
    }

    /// Send `request` and wait for the next frame.
    ///
    /// An empty request only polls: `Ok(None)` means no unsolicited frame
    /// arrived within the response timeout. A non-empty request that gets no
    /// frame back is a [`TransportError::SilentAfterSend`] and is retried.
    ///
    /// Connects on demand. Blocks behind any other caller.
    pub fn io(&self, request: &[u8]) -> Result<Option<Frame>, TransportError> {
        let mut session = self.session.lock();
        let result = self.run(&mut session, request);
        self.monitor.set_phase(Phase::Idle);
        result
    }

    fn run(
        &self,
        session: &mut StreamSession<T>,
        request: &[u8],
    ) -> Result<Option<Frame>, TransportError> {
        let attempts = self.config.retries;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.backoff(attempt - 1);
                self.monitor.set_phase(Phase::Backoff);
                debug!(attempt, ?delay, "backing off");
                self.clock.sleep(delay);
            }

            self.monitor.record_communication(self.clock.now());

            let err = match self.attempt(session, request) {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            self.monitor.record_failed_attempt();
            session.close_quietly();

            if !err.is_retryable() {
                error!(error = %err, "request failed");
                return Err(err);
            }

            let made = attempt + 1;
            if made == attempts {
                error!(attempts, error = %err, "request failed, giving up");
                return Err(TransportError::RetriesExhausted { attempts, last: Box::new(err) });
            }
            warn!(attempt = made, of = attempts, error = %err, "attempt failed, retrying");
        }

        // validate() guarantees at least one attempt
        Err(TransportError::NotConnected)
    }

    fn attempt(
        &self,
        session: &mut StreamSession<T>,
        request: &[u8],
    ) -> Result<Option<Frame>, TransportError> {
        if !session.is_ready() {
            self.monitor.set_phase(Phase::Connecting);
            session.connect(&self.endpoint, self.config.establish_timeout())?;
        }

        if !request.is_empty() {
            self.monitor.set_phase(Phase::Sending);
            session.send(request)?;
        }

        self.monitor.set_phase(Phase::AwaitingResponse);
        let timeout = self.config.response_timeout();
        match session.receive(timeout)? {
            Some(frame) => {
                self.monitor.record_success(self.clock.now());
                debug!(?frame, "response received");
                Ok(Some(frame))
            },
            None if request.is_empty() => Ok(None),
            None => Err(TransportError::SilentAfterSend(timeout)),
        }
    }

    /// Send a packet and decode the response.
    ///
    /// A response that arrives but does not decode is returned as
    /// [`TransportError::Protocol`] without retrying.
    pub fn request(&self, packet: &Packet) -> Result<Option<Packet>, TransportError> {
        let frame = packet.encode()?;
        match self.io(frame.as_bytes())? {
            Some(response) => Ok(Some(Packet::decode(&response)?)),
            None => Ok(None),
        }
    }

    /// Wait for an unsolicited frame without sending anything.
    pub fn poll(&self) -> Result<Option<Frame>, TransportError> {
        self.io(&[])
    }

    /// Whether a session is currently established.
    ///
    /// Never blocks and never triggers a connect.
    pub fn is_alive(&self) -> bool {
        self.monitor.state() == SessionState::Ready
    }

    /// Whether a received frame is waiting to be picked up.
    ///
    /// Never blocks and never triggers a connect.
    pub fn is_message_available(&self) -> bool {
        self.monitor.pending_frames() > 0
    }

    /// Last attempted exchange, successful or not.
    pub fn last_communication(&self) -> Option<SystemTime> {
        self.monitor.last_communication()
    }

    /// Last exchange that produced a frame.
    pub fn last_successful_communication(&self) -> Option<SystemTime> {
        self.monitor.last_successful_communication()
    }

    /// Health snapshot.
    pub fn health(&self) -> Health {
        self.monitor.health()
    }

    /// Configuration in use.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Close the session. The next [`Client::io`] reconnects.
    pub fn reset_connection(&self) {
        let mut session = self.session.lock();
        if let Err(err) = session.close() {
            warn!(error = %err, "reset closed with errors");
        }
        info!(endpoint = %self.endpoint, "connection reset");
    }
}
