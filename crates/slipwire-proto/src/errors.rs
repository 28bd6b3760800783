//! Protocol error types.

use thiserror::Error;

use crate::frame::Anomaly;

/// Errors raised while validating or decoding wire data.
///
/// The [`crate::Framer`] never returns these: it reports problems as
/// [`Anomaly`] events and keeps going. They surface only when a caller
/// explicitly builds a [`crate::Frame`] or decodes a [`crate::Packet`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Bytes do not form a delimited frame
    #[error("invalid frame: {0}")]
    InvalidFrame(Anomaly),

    /// Escape byte at the very end of the body
    #[error("dangling SLIP escape at end of frame")]
    DanglingEscape,

    /// Escape byte followed by something other than an escaped marker/escape
    #[error("invalid SLIP escape sequence 0xDB 0x{0:02X}")]
    InvalidEscape(u8),

    /// Raw marker byte found inside a frame body
    #[error("unescaped marker byte at body offset {0}")]
    UnescapedMarker(usize),

    /// Declared length byte disagrees with the body
    #[error("length mismatch: header declares {declared}, body carries {actual}")]
    LengthMismatch {
        /// Value of the length byte
        declared: usize,
        /// Length actually present after unescaping
        actual: usize,
    },

    /// XOR checksum over the body does not match the trailing byte
    #[error("checksum mismatch: computed 0x{computed:02X}, frame carries 0x{found:02X}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes
        computed: u8,
        /// Checksum byte found in the frame
        found: u8,
    },

    /// Packet data does not fit in a single frame
    #[error("packet data too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Size that was requested
        size: usize,
        /// Maximum accepted size
        max: usize,
    },
}

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
