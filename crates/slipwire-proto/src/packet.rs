//! Command packets carried inside frames.
//!
//! Unescaped body layout:
//!
//! ```text
//! ┌─────────────┬────────┬─────────────┬──────────┬──────────┐
//! │ protocol id │ length │ command u16 │ data ... │ checksum │
//! │    0x00     │ data+3 │  big endian │          │   XOR    │
//! └─────────────┴────────┴─────────────┴──────────┴──────────┘
//! ```
//!
//! The checksum is the XOR of every preceding body byte. This crate does not
//! interpret command numbers; device vocabularies live above the transport.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Frame, MARKER, PROTOCOL_ID, ProtocolError, Result, slip};

/// Largest data section that still fits the one-byte length field.
pub const MAX_DATA_LEN: usize = u8::MAX as usize - 3;

/// Decoded command packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Command number
    pub command: u16,
    /// Command data, possibly empty
    pub data: Bytes,
}

impl Packet {
    /// Create a packet.
    pub fn new(command: u16, data: impl Into<Bytes>) -> Self {
        Self { command, data: data.into() }
    }

    /// Encode into a delimited, escaped frame.
    pub fn encode(&self) -> Result<Frame> {
        if self.data.len() > MAX_DATA_LEN {
            return Err(ProtocolError::PayloadTooLarge { size: self.data.len(), max: MAX_DATA_LEN });
        }

        let mut body = BytesMut::with_capacity(self.data.len() + 5);
        body.put_u8(PROTOCOL_ID);
        body.put_u8((self.data.len() + 3) as u8);
        body.put_u16(self.command);
        body.put_slice(&self.data);
        body.put_u8(checksum(&body));

        let mut wire = BytesMut::with_capacity(body.len() * 2 + 2);
        wire.put_u8(MARKER);
        slip::escape_into(&body, &mut wire);
        wire.put_u8(MARKER);

        Ok(Frame::from_validated(wire.freeze()))
    }

    /// Unescape and validate a frame body.
    pub fn decode(frame: &Frame) -> Result<Self> {
        let body = slip::unescape(frame.body())?;
        let (&found, rest) = body.split_last().ok_or(ProtocolError::LengthMismatch {
            declared: 0,
            actual: 0,
        })?;

        // Frame validation guarantees at least protocol id, length, command
        if rest.len() < 4 {
            return Err(ProtocolError::LengthMismatch { declared: 3, actual: rest.len() });
        }

        let computed = checksum(rest);
        if computed != found {
            return Err(ProtocolError::ChecksumMismatch { computed, found });
        }

        let declared = rest[1] as usize;
        // Length covers command, data and checksum
        let actual = rest.len() - 1;
        if declared != actual {
            return Err(ProtocolError::LengthMismatch { declared, actual });
        }

        let command = u16::from_be_bytes([rest[2], rest[3]]);
        Ok(Self { command, data: Bytes::copy_from_slice(&rest[4..]) })
    }
}

/// XOR of all bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}
