//! Clock abstraction.
//!
//! The client never reads the system clock or sleeps directly. Both go through
//! [`Clock`] so tests can observe backoff delays and control timestamps without
//! waiting in real time.

use std::time::{Duration, SystemTime};

/// Source of wall-clock time and blocking sleeps.
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time.
    fn now(&self) -> SystemTime;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Production clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
