//! Arbitrary frames through the packet decoder.
//!
//! Decoding must never panic, and anything that decodes must re-encode to a
//! frame that decodes to the same packet.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slipwire_proto::{Frame, Packet};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::new(data.to_vec()) else {
        return;
    };
    let Ok(packet) = Packet::decode(&frame) else {
        return;
    };

    let reencoded = packet.encode().unwrap();
    assert_eq!(Packet::decode(&reencoded).unwrap(), packet);
});
