//! Arbitrary bytes through the framer, split at an arbitrary point.
//!
//! Every emitted frame must pass validation, and splitting the input must not
//! change what comes out.

#![no_main]

use libfuzzer_sys::fuzz_target;
use slipwire_proto::{Frame, Framer, FramerEvent, MIN_FRAME_LEN};

fuzz_target!(|data: &[u8]| {
    let Some((&split, data)) = data.split_first() else {
        return;
    };
    let split = usize::from(split).min(data.len());

    let mut whole = Framer::with_capacity(64);
    let expected: Vec<FramerEvent> = whole.push(data);

    let mut parts = Framer::with_capacity(64);
    let mut actual = parts.push(&data[..split]);
    actual.extend(parts.push(&data[split..]));

    assert_eq!(expected, actual);

    for event in &expected {
        if let FramerEvent::Frame(frame) = event {
            assert!(frame.len() >= MIN_FRAME_LEN);
            assert!(Frame::check(frame.as_bytes()).is_ok());
        }
    }
});
