//! Test harness for slipwire.
//!
//! Drives the real [`slipwire_core::Client`] against an in-memory gateway
//! instead of a socket. Every failure mode the transport has to survive can be
//! switched on from the test: refused connects, silence, garbage between
//! frames, broken writes, reads that fail or hang, and close calls that fail.
//!
//! # Components
//!
//! - [`memory`]: [`MemoryTransport`] and [`MemoryStream`] with fault injection
//! - [`responder`]: Scripted gateway behaviours
//! - [`clock`]: [`ManualClock`] recording backoff sleeps
//! - [`noise`]: Seeded garbage for resynchronization tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod memory;
pub mod noise;
pub mod responder;

pub use clock::ManualClock;
pub use memory::{Faults, MemoryStream, MemoryTransport};
pub use responder::Responder;
