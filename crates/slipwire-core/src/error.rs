//! Error types for the transport.

use std::{io, time::Duration};

use slipwire_proto::ProtocolError;
use thiserror::Error;

use crate::config::Endpoint;

/// Errors surfaced by sessions, readers and the client.
///
/// Framing anomalies are not represented here: the reader recovers from them
/// locally and only counts them (see [`crate::LinkMonitor`]).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Operation needs a ready session
    #[error("session is not connected")]
    NotConnected,

    /// Transport establishment (socket connect, TLS handshake) failed
    #[error("connecting to {endpoint} failed: {source}")]
    Connect {
        /// Where we tried to connect
        endpoint: Endpoint,
        /// Underlying failure
        #[source]
        source: io::Error,
    },

    /// Write or flush on an established stream failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A request was written but nothing came back in time
    #[error("no response within {0:?} after sending request")]
    SilentAfterSend(Duration),

    /// Background reader terminated on an I/O error
    #[error("background reader failed: {0}")]
    ReaderFailed(#[source] io::Error),

    /// Background reader is no longer running
    #[error("background reader stopped")]
    ReaderStopped,

    /// Background reader did not exit within the bounded wait
    #[error("background reader did not stop within {0:?}")]
    StopTimeout(Duration),

    /// Response frame could not be decoded as a packet
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Every attempt of an `io` call failed
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        #[source]
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Whether the client may retry after this error.
    ///
    /// Everything that stems from the link itself is retryable; a fresh
    /// session may succeed where the old one failed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Protocol(_) | Self::RetriesExhausted { .. })
    }

    /// Innermost error, looking through retry exhaustion.
    pub fn root(&self) -> &Self {
        match self {
            Self::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No host to connect to
    #[error("endpoint address is empty")]
    EmptyAddress,

    /// At least one attempt is required
    #[error("retries must be at least 1")]
    ZeroRetries,

    /// A timeout or interval was zero
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// A capacity was zero
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    /// Establishing would be cut off sooner than a steady-state read
    #[error("establishTimeoutMs ({establish_ms}) is shorter than steadyStateTimeoutMs ({steady_state_ms})")]
    EstablishShorterThanSteadyState {
        /// Configured establish timeout
        establish_ms: u64,
        /// Configured steady-state timeout
        steady_state_ms: u64,
    },
}
