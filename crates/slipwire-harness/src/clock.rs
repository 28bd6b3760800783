//! Manual clock.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use slipwire_core::Clock;

#[derive(Debug)]
struct Inner {
    now: SystemTime,
    sleeps: Vec<Duration>,
}

/// Clock that only moves when told to.
///
/// `sleep` returns immediately, records the requested duration and advances
/// the clock by it, so backoff schedules can be asserted without waiting.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<Inner>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl ManualClock {
    /// Clock starting at `now`.
    pub fn new(now: SystemTime) -> Self {
        Self { inner: Arc::new(Mutex::new(Inner { now, sleeps: Vec::new() })) }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock();
        inner.now += by;
    }

    /// Jump to `now`, possibly backwards.
    pub fn set(&self, now: SystemTime) {
        self.inner.lock().now = now;
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().sleeps.clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.inner.lock().now
    }

    fn sleep(&self, duration: Duration) {
        let mut inner = self.inner.lock();
        inner.sleeps.push(duration);
        inner.now += duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_advances_and_records() {
        let clock = ManualClock::default();
        let start = clock.now();

        clock.sleep(Duration::from_millis(250));
        clock.advance(Duration::from_secs(1));

        assert_eq!(clock.now(), start + Duration::from_millis(1250));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
    }
}
