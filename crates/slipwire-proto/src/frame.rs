//! Delimited frames.

use std::fmt;

use bytes::Bytes;

use crate::{MARKER, MIN_FRAME_LEN, PROTOCOL_ID, ProtocolError};

/// Why a candidate frame was thrown away.
///
/// Anomalies are recoverable: the framer drops the offending bytes and
/// resynchronizes on the next marker. They exist so callers can count and log
/// link quality problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// Fewer bytes between the markers than the smallest valid frame
    TooShort {
        /// Length of the candidate, markers included
        len: usize,
    },
    /// Second byte is not the protocol discriminator
    BadDiscriminator {
        /// Byte found after the opening marker
        found: u8,
    },
    /// Candidate does not begin or end with a marker
    MissingMarker,
    /// No closing marker within the partial-frame buffer capacity
    Overflow {
        /// Bytes discarded
        len: usize,
    },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => {
                write!(f, "frame of {len} bytes is shorter than {MIN_FRAME_LEN}")
            },
            Self::BadDiscriminator { found } => {
                write!(f, "unexpected protocol discriminator 0x{found:02X}")
            },
            Self::MissingMarker => write!(f, "frame is not delimited by 0x{MARKER:02X}"),
            Self::Overflow { len } => write!(f, "no frame boundary within {len} bytes"),
        }
    }
}

/// One complete, still-escaped message as it appeared on the wire.
///
/// Always starts with `MARKER PROTOCOL_ID`, ends with `MARKER` and is at least
/// [`MIN_FRAME_LEN`] bytes long. Cloning is cheap (reference counted).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Validate `bytes` and wrap them as a frame.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let bytes = bytes.into();
        Self::check(&bytes).map_err(ProtocolError::InvalidFrame)?;
        Ok(Self { bytes })
    }

    /// Wrap bytes that the caller has already validated.
    pub(crate) fn from_validated(bytes: Bytes) -> Self {
        debug_assert!(Self::check(&bytes).is_ok());
        Self { bytes }
    }

    /// Check whether `candidate` satisfies the frame invariants.
    pub fn check(candidate: &[u8]) -> Result<(), Anomaly> {
        if candidate.len() < MIN_FRAME_LEN {
            return Err(Anomaly::TooShort { len: candidate.len() });
        }
        if candidate[0] != MARKER || candidate[candidate.len() - 1] != MARKER {
            return Err(Anomaly::MissingMarker);
        }
        if candidate[1] != PROTOCOL_ID {
            return Err(Anomaly::BadDiscriminator { found: candidate[1] });
        }
        Ok(())
    }

    /// Full frame, markers included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Escaped body between the two markers.
    pub fn body(&self) -> &[u8] {
        &self.bytes[1..self.bytes.len() - 1]
    }

    /// Total length, markers included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Frames are never empty; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume the frame and return the underlying buffer.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({})", hex::encode(&self.bytes))
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = ProtocolError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::new(Bytes::copy_from_slice(value))
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn accepts_minimum_frame() {
        let frame = Frame::new(hex!("C0 00 03 00 01 02 C0").to_vec()).unwrap();
        assert_eq!(frame.len(), MIN_FRAME_LEN);
        assert_eq!(frame.body(), &hex!("00 03 00 01 02"));
    }

    #[test]
    fn rejects_short_frame() {
        let err = Frame::new(hex!("C0 00 C0").to_vec()).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidFrame(Anomaly::TooShort { len: 3 }));
    }

    #[test]
    fn rejects_wrong_discriminator() {
        let result = Frame::check(&hex!("C0 01 02 03 04 05 C0"));
        assert_eq!(result, Err(Anomaly::BadDiscriminator { found: 0x01 }));
    }

    #[test]
    fn rejects_missing_closing_marker() {
        let result = Frame::check(&hex!("C0 00 02 03 04 05 06"));
        assert_eq!(result, Err(Anomaly::MissingMarker));
    }

    #[test]
    fn debug_renders_hex() {
        let frame = Frame::try_from(&hex!("C0 00 01 02 03 04 05 C0")[..]).unwrap();
        assert_eq!(format!("{frame:?}"), "Frame(c0000102030405c0)");
    }
}
