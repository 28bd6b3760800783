//! Seeded line noise.
//!
//! Same seed, same bytes, so a failing resynchronization test reproduces.
//! Noise never contains a marker or the protocol id, so it can never be
//! mistaken for a frame.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use slipwire_proto::{Frame, MARKER, PROTOCOL_ID};

/// `len` random bytes, none of them a marker or the protocol id.
pub fn noise(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..len)
        .map(|_| loop {
            let byte: u8 = rng.gen_range(0..=u8::MAX);
            if byte != MARKER && byte != PROTOCOL_ID {
                break byte;
            }
        })
        .collect()
}

/// Frames with a burst of noise (up to `max_burst` bytes) before each one.
pub fn interleave(seed: u64, frames: &[Frame], max_burst: usize) -> Vec<u8> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut out = Vec::new();

    for frame in frames {
        let burst = rng.gen_range(0..=max_burst);
        out.extend(noise(rng.gen_range(0..u64::MAX), burst));
        out.extend_from_slice(frame.as_bytes());
    }
    out
}
