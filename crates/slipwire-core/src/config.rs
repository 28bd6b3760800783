//! Transport configuration.
//!
//! Keys follow the gateway configuration surface (`endpointAddress`, `port`,
//! `establishTimeoutMs`, `steadyStateTimeoutMs`, `retries`). Everything except
//! the address has a default.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use slipwire_proto::DEFAULT_FRAME_CAPACITY;

use crate::error::ConfigError;

/// Default deadline for socket connect plus secure-channel handshake.
pub const DEFAULT_ESTABLISH_TIMEOUT_MS: u64 = 10_000;

/// Default per-read deadline once connected.
pub const DEFAULT_STEADY_STATE_TIMEOUT_MS: u64 = 2_000;

/// Default number of attempts per `io` call.
pub const DEFAULT_RETRIES: u32 = 5;

/// Default frame queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// Default bounded wait for the reader thread to exit.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 15_000;

/// Remote host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportConfig {
    /// Host name or IP address of the gateway
    pub endpoint_address: String,
    /// TCP port of the gateway
    pub port: u16,
    /// Deadline for connect plus handshake
    pub establish_timeout_ms: u64,
    /// Per-read deadline once connected
    pub steady_state_timeout_ms: u64,
    /// Attempts per `io` call, the first one included
    pub retries: u32,
    /// How long to wait for a response; defaults to the steady-state timeout
    pub response_timeout_ms: Option<u64>,
    /// Backoff unit; defaults to the steady-state timeout
    pub backoff_base_ms: Option<u64>,
    /// Frames buffered before the oldest is evicted
    pub queue_capacity: usize,
    /// Partial-frame buffer capacity in bytes
    pub max_frame_length: usize,
    /// Bounded wait for the reader thread to exit
    pub stop_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint_address: String::new(),
            port: 51200,
            establish_timeout_ms: DEFAULT_ESTABLISH_TIMEOUT_MS,
            steady_state_timeout_ms: DEFAULT_STEADY_STATE_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            response_timeout_ms: None,
            backoff_base_ms: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_length: DEFAULT_FRAME_CAPACITY,
            stop_timeout_ms: DEFAULT_STOP_TIMEOUT_MS,
        }
    }
}

impl TransportConfig {
    /// Configuration for `host:port` with defaults for everything else.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { endpoint_address: host.into(), port, ..Self::default() }
    }

    /// Set the establish timeout.
    #[must_use]
    pub fn with_establish_timeout(mut self, timeout: Duration) -> Self {
        self.establish_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the steady-state read timeout.
    #[must_use]
    pub fn with_steady_state_timeout(mut self, timeout: Duration) -> Self {
        self.steady_state_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the response timeout.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the backoff unit.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base_ms = Some(base.as_millis() as u64);
        self
    }

    /// Set the number of attempts per `io` call.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the frame queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the reader stop timeout.
    #[must_use]
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Check that every value is usable.
    ///
    /// The establish timeout may equal the steady-state timeout but not be
    /// shorter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }

        let durations = [
            ("establishTimeoutMs", Some(self.establish_timeout_ms)),
            ("steadyStateTimeoutMs", Some(self.steady_state_timeout_ms)),
            ("responseTimeoutMs", self.response_timeout_ms),
            ("backoffBaseMs", self.backoff_base_ms),
            ("stopTimeoutMs", Some(self.stop_timeout_ms)),
        ];
        if let Some((name, _)) = durations.into_iter().find(|(_, value)| *value == Some(0)) {
            return Err(ConfigError::ZeroDuration(name));
        }
        if self.establish_timeout_ms < self.steady_state_timeout_ms {
            return Err(ConfigError::EstablishShorterThanSteadyState {
                establish_ms: self.establish_timeout_ms,
                steady_state_ms: self.steady_state_timeout_ms,
            });
        }

        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("queueCapacity"));
        }
        if self.max_frame_length == 0 {
            return Err(ConfigError::ZeroCapacity("maxFrameLength"));
        }

        Ok(())
    }

    /// Where to connect.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.endpoint_address.clone(), self.port)
    }

    /// Deadline for connect plus handshake.
    pub fn establish_timeout(&self) -> Duration {
        Duration::from_millis(self.establish_timeout_ms)
    }

    /// Per-read deadline once connected.
    pub fn steady_state_timeout(&self) -> Duration {
        Duration::from_millis(self.steady_state_timeout_ms)
    }

    /// How long `io` waits for a frame after sending.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms.unwrap_or(self.steady_state_timeout_ms))
    }

    /// Reader stop deadline.
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Delay after failed attempt number `attempt` (zero based):
    /// `2^attempt × base`, saturating.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = Duration::from_millis(self.backoff_base_ms.unwrap_or(self.steady_state_timeout_ms));
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        base.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_keys() {
        let config: TransportConfig = serde_json::from_str(
            r#"{
                "endpointAddress": "192.168.1.20",
                "port": 51200,
                "establishTimeoutMs": 30000,
                "steadyStateTimeoutMs": 1500,
                "retries": 3
            }"#,
        )
        .unwrap();

        assert_eq!(config.endpoint(), Endpoint::new("192.168.1.20", 51200));
        assert_eq!(config.establish_timeout(), Duration::from_secs(30));
        assert_eq!(config.steady_state_timeout(), Duration::from_millis(1500));
        assert_eq!(config.retries, 3);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn response_timeout_defaults_to_steady_state() {
        let config = TransportConfig::new("gw", 1).with_steady_state_timeout(Duration::from_millis(700));
        assert_eq!(config.response_timeout(), Duration::from_millis(700));

        let config = config.with_response_timeout(Duration::from_secs(4));
        assert_eq!(config.response_timeout(), Duration::from_secs(4));
    }

    #[test]
    fn backoff_doubles() {
        let config = TransportConfig::new("gw", 1).with_backoff_base(Duration::from_millis(100));

        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(1600));
        // Saturates instead of overflowing
        assert!(config.backoff(64) >= config.backoff(31));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert_eq!(TransportConfig::default().validate(), Err(ConfigError::EmptyAddress));
        assert_eq!(
            TransportConfig::new("gw", 1).with_retries(0).validate(),
            Err(ConfigError::ZeroRetries)
        );
        assert_eq!(
            TransportConfig::new("gw", 1).with_steady_state_timeout(Duration::ZERO).validate(),
            Err(ConfigError::ZeroDuration("steadyStateTimeoutMs"))
        );
        assert_eq!(
            TransportConfig::new("gw", 1).with_queue_capacity(0).validate(),
            Err(ConfigError::ZeroCapacity("queueCapacity"))
        );
    }

    #[test]
    fn validate_rejects_establish_shorter_than_steady_state() {
        let config = TransportConfig::new("gw", 1)
            .with_establish_timeout(Duration::from_millis(500))
            .with_steady_state_timeout(Duration::from_secs(2));

        assert_eq!(
            config.validate(),
            Err(ConfigError::EstablishShorterThanSteadyState {
                establish_ms: 500,
                steady_state_ms: 2000
            })
        );
        assert_eq!(config.with_establish_timeout(Duration::from_secs(2)).validate(), Ok(()));
    }

    #[test]
    fn endpoint_display_brackets_ipv6() {
        assert_eq!(Endpoint::new("::1", 8443).to_string(), "[::1]:8443");
        assert_eq!(Endpoint::new("gw.local", 8443).to_string(), "gw.local:8443");
    }
}
