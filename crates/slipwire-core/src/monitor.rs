//! Link health and counters.
//!
//! Everything here is readable without taking the client's serialization lock,
//! so liveness probes never wait behind an in-flight request and never touch
//! the connection themselves.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use parking_lot::RwLock;

use crate::{queue::FrameQueue, session::SessionState};

/// Where the client is within an `io` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No call in progress
    Idle,
    /// Establishing a session
    Connecting,
    /// Writing the request
    Sending,
    /// Waiting for the response frame
    AwaitingResponse,
    /// Sleeping before the next attempt
    Backoff,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Sending,
            3 => Self::AwaitingResponse,
            4 => Self::Backoff,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Connecting => 1,
            Self::Sending => 2,
            Self::AwaitingResponse => 3,
            Self::Backoff => 4,
        }
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames delivered by the framer
    pub frames_received: u64,
    /// Candidates discarded during resynchronization
    pub anomalies: u64,
    /// Frames evicted from a full queue
    pub frames_evicted: u64,
    /// Sessions successfully established
    pub connects: u64,
    /// Attempts that ended in an error
    pub failed_attempts: u64,
}

/// Point-in-time view of the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Health {
    /// Session state
    pub state: SessionState,
    /// Client phase
    pub phase: Phase,
    /// Last attempted exchange, successful or not
    pub last_communication: Option<SystemTime>,
    /// Last exchange that produced a frame
    pub last_successful_communication: Option<SystemTime>,
    /// Frames waiting to be picked up
    pub pending_frames: usize,
    /// Counters
    pub stats: LinkStats,
}

impl Health {
    /// Time between the last success and the last attempt.
    ///
    /// Zero while the link is healthy, growing while attempts keep failing.
    /// `None` if nothing was attempted yet.
    pub fn silence(&self) -> Option<Duration> {
        let attempted = self.last_communication?;
        let succeeded = self.last_successful_communication.unwrap_or(UNIX_EPOCH);
        Some(attempted.duration_since(succeeded).unwrap_or(Duration::ZERO))
    }
}

/// Shared, lock-free view of one client's link.
#[derive(Debug, Default)]
pub struct LinkMonitor {
    state: AtomicU8,
    phase: AtomicU8,
    last_communication_ms: AtomicU64,
    last_success_ms: AtomicU64,
    frames_received: AtomicU64,
    anomalies: AtomicU64,
    frames_evicted: AtomicU64,
    connects: AtomicU64,
    failed_attempts: AtomicU64,
    queue: RwLock<Option<Arc<FrameQueue>>>,
}

impl LinkMonitor {
    /// Fresh monitor for a disconnected link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Current client phase.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    /// Last attempted exchange.
    pub fn last_communication(&self) -> Option<SystemTime> {
        from_millis(self.last_communication_ms.load(Ordering::Acquire))
    }

    /// Last exchange that produced a frame.
    pub fn last_successful_communication(&self) -> Option<SystemTime> {
        from_millis(self.last_success_ms.load(Ordering::Acquire))
    }

    // Timestamps only move forward, even if the wall clock steps back.
    pub(crate) fn record_communication(&self, now: SystemTime) {
        self.last_communication_ms.fetch_max(to_millis(now), Ordering::AcqRel);
    }

    pub(crate) fn record_success(&self, now: SystemTime) {
        let millis = to_millis(now);
        self.last_communication_ms.fetch_max(millis, Ordering::AcqRel);
        self.last_success_ms.fetch_max(millis, Ordering::AcqRel);
    }

    pub(crate) fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_anomaly(&self) {
        self.anomalies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.frames_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_attempt(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn attach_queue(&self, queue: Arc<FrameQueue>) {
        *self.queue.write() = Some(queue);
    }

    pub(crate) fn detach_queue(&self) {
        *self.queue.write() = None;
    }

    /// Frames queued on the current session, zero if disconnected.
    pub fn pending_frames(&self) -> usize {
        self.queue.read().as_ref().map_or(0, |queue| queue.len())
    }

    /// Counter snapshot.
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            anomalies: self.anomalies.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
        }
    }

    /// Full snapshot.
    pub fn health(&self) -> Health {
        Health {
            state: self.state(),
            phase: self.phase(),
            last_communication: self.last_communication(),
            last_successful_communication: self.last_successful_communication(),
            pending_frames: self.pending_frames(),
            stats: self.stats(),
        }
    }
}

fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
}

fn from_millis(millis: u64) -> Option<SystemTime> {
    (millis != 0).then(|| UNIX_EPOCH + Duration::from_millis(millis))
}
