//! RFC 1055 byte stuffing.
//!
//! Inside a frame body the marker `0xC0` is sent as `0xDB 0xDC` and the escape
//! byte `0xDB` itself as `0xDB 0xDD`. No other byte is touched.

use bytes::{BufMut, BytesMut};

use crate::{MARKER, ProtocolError, Result};

/// Escape introducer.
pub const ESC: u8 = 0xDB;

/// Second byte of an escaped marker.
pub const ESC_END: u8 = 0xDC;

/// Second byte of an escaped escape.
pub const ESC_ESC: u8 = 0xDD;

/// Append `src` to `dst` with markers and escapes stuffed.
pub fn escape_into(src: &[u8], dst: &mut BytesMut) {
    dst.reserve(src.len());
    for &byte in src {
        match byte {
            MARKER => dst.put_slice(&[ESC, ESC_END]),
            ESC => dst.put_slice(&[ESC, ESC_ESC]),
            other => dst.put_u8(other),
        }
    }
}

/// Reverse [`escape_into`] for a complete frame body.
pub fn unescape(src: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(src.len());
    let mut iter = src.iter().copied().enumerate();

    while let Some((offset, byte)) = iter.next() {
        match byte {
            ESC => match iter.next() {
                Some((_, ESC_END)) => out.push(MARKER),
                Some((_, ESC_ESC)) => out.push(ESC),
                Some((_, other)) => return Err(ProtocolError::InvalidEscape(other)),
                None => return Err(ProtocolError::DanglingEscape),
            },
            MARKER => return Err(ProtocolError::UnescapedMarker(offset)),
            other => out.push(other),
        }
    }

    Ok(out)
}
