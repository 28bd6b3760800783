//! Synchronous request/response transport over an unreliable byte stream.
//!
//! Embedded gateways expose a single duplex byte stream (usually TLS over TCP)
//! carrying SLIP-delimited frames. This crate turns that stream into a
//! blocking `request -> response` call with timeouts, retries and transparent
//! reconnection.
//!
//! # Architecture
//!
//! ```text
//!   caller ──► Client::io ──► StreamSession::send ──► DuplexStream
//!                 │                                       │
//!                 │ retry / backoff                       │ bytes
//!                 ▼                                       ▼
//!          StreamSession::receive ◄── FrameQueue ◄── Reader thread (Framer)
//! ```
//!
//! One background [`reader::Reader`] thread per connected session pulls bytes
//! off the stream, cuts them into frames and pushes them into a bounded
//! [`FrameQueue`] that evicts the oldest entry when full. The [`Client`]
//! serializes callers, sends the request and waits on the queue for the next
//! frame. Any failure resets the whole session before the next attempt, so a
//! half-open stream never survives a retry.
//!
//! # Components
//!
//! - [`client`]: Request/response orchestrator (retry, backoff, liveness)
//! - [`session`]: Stream session lifecycle (connect, send, receive, close)
//! - [`reader`]: Background reader thread
//! - [`queue`]: Bounded drop-oldest frame queue
//! - [`transport`]: Pluggable stream establishment (TCP, TLS)
//! - [`monitor`]: Lock-free health and counters
//! - [`mod@env`]: Clock abstraction (time, sleeping)
//! - [`config`]: Configuration surface
//! - [`error`]: Error types

pub mod client;
pub mod config;
pub mod env;
pub mod error;
pub mod monitor;
pub mod queue;
pub mod reader;
pub mod session;
pub mod transport;

pub use client::Client;
pub use config::{Endpoint, TransportConfig};
pub use env::{Clock, SystemClock};
pub use error::{ConfigError, TransportError};
pub use monitor::{Health, LinkMonitor, LinkStats, Phase};
pub use queue::FrameQueue;
pub use session::{SessionState, StreamSession};
pub use slipwire_proto::{Frame, Packet};
pub use transport::{DuplexStream, TcpTransport, Transport};
#[cfg(feature = "tls")]
pub use transport::tls::{TlsError, TlsTransport};
