//! Wire format for the slipwire transport.
//!
//! Embedded gateways speak a SLIP-delimited protocol: every message starts and
//! ends with the reserved marker byte `0xC0`, and any marker or escape byte in
//! the body is escaped per RFC 1055. The second byte of every frame is a fixed
//! protocol discriminator, and the shortest meaningful frame is seven bytes
//! (two markers plus protocol id, length, a two-byte command and a checksum).
//!
//! This crate is split in two layers:
//!
//! - [`Framer`] cuts a raw byte stream into [`Frame`]s without decoding them.
//!   Malformed input is discarded and reported as an [`Anomaly`], never as an
//!   error, so a noisy link resynchronizes at the next marker.
//! - [`Packet`] decodes a frame body (unescape, length, XOR checksum) into a
//!   command and its data, and encodes packets back into frames.
//!
//! Nothing in this crate performs I/O.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod framer;
pub mod packet;
pub mod slip;

pub use errors::{ProtocolError, Result};
pub use frame::{Anomaly, Frame};
pub use framer::{Framer, FramerEvent};
pub use packet::Packet;

/// Reserved delimiter byte that opens and closes every frame.
pub const MARKER: u8 = 0xC0;

/// Protocol discriminator expected right after the opening marker.
pub const PROTOCOL_ID: u8 = 0x00;

/// Smallest valid frame, both markers included.
pub const MIN_FRAME_LEN: usize = 7;

/// Default capacity of the partial-frame buffer.
///
/// Large enough for the biggest packet (255 body bytes) even if every body
/// byte had to be escaped.
pub const DEFAULT_FRAME_CAPACITY: usize = 1024;
