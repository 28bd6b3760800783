//! Byte stream to frame conversion.
//!
//! The framer accumulates bytes into a fixed-capacity partial-frame buffer.
//! When a marker arrives and the buffer holds more than a lone opening marker,
//! the buffer is closed off as a candidate frame and validated. A valid
//! candidate is emitted; an invalid one is discarded. Either way the triggering
//! marker seeds the next buffer, because on this wire a marker can end one
//! frame and begin the next.
//!
//! ```text
//!   bytes ──► [C0 ...] ──marker──► check ──ok──► Frame
//!                 ▲                   │
//!                 └──── [C0] ◄────────┴──bad───► Anomaly (resync)
//! ```
//!
//! Bytes that arrive while no frame is open (before the first marker, or after
//! an overflow) are dropped until the next marker. Two adjacent markers are an
//! idle delimiter, not an empty frame.

use bytes::{BufMut, BytesMut};

use crate::{DEFAULT_FRAME_CAPACITY, Frame, MARKER, MIN_FRAME_LEN, frame::Anomaly};

/// Outcome of feeding bytes to the [`Framer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerEvent {
    /// A complete, validated frame
    Frame(Frame),
    /// A candidate was discarded and the framer resynchronized
    Resync(Anomaly),
}

/// Incremental SLIP frame delimiter.
#[derive(Debug)]
pub struct Framer {
    buffer: BytesMut,
    capacity: usize,
    frames: u64,
    resyncs: u64,
}

impl Framer {
    /// Framer with [`DEFAULT_FRAME_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FRAME_CAPACITY)
    }

    /// Framer whose partial-frame buffer holds at most `capacity` bytes.
    ///
    /// Capacities below [`MIN_FRAME_LEN`] are raised to it, otherwise no frame
    /// could ever be emitted.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_FRAME_LEN);
        Self { buffer: BytesMut::with_capacity(capacity), capacity, frames: 0, resyncs: 0 }
    }

    /// Feed a chunk and collect every event it produces, in stream order.
    pub fn push(&mut self, data: &[u8]) -> Vec<FramerEvent> {
        data.iter().filter_map(|&byte| self.push_byte(byte)).collect()
    }

    /// Feed a single byte.
    pub fn push_byte(&mut self, byte: u8) -> Option<FramerEvent> {
        if self.buffer.is_empty() {
            // Hunting for a frame start
            if byte == MARKER {
                self.buffer.put_u8(byte);
            }
            return None;
        }

        if byte == MARKER && self.buffer.len() == 1 {
            return None;
        }

        if self.buffer.len() == self.capacity {
            let len = self.buffer.len() + 1;
            self.buffer.clear();
            if byte == MARKER {
                self.buffer.put_u8(MARKER);
            }
            return Some(self.resync(Anomaly::Overflow { len }));
        }

        self.buffer.put_u8(byte);
        if byte != MARKER {
            return None;
        }

        let candidate = self.buffer.split().freeze();
        self.buffer.put_u8(MARKER);

        match Frame::check(&candidate) {
            Ok(()) => {
                self.frames += 1;
                Some(FramerEvent::Frame(Frame::from_validated(candidate)))
            },
            Err(anomaly) => Some(self.resync(anomaly)),
        }
    }

    fn resync(&mut self, anomaly: Anomaly) -> FramerEvent {
        self.resyncs += 1;
        FramerEvent::Resync(anomaly)
    }

    /// Bytes currently held for the frame being assembled.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Frames emitted so far.
    pub fn frames_emitted(&self) -> u64 {
        self.frames
    }

    /// Resynchronization events so far.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;
    use crate::PROTOCOL_ID;

    fn frames(events: &[FramerEvent]) -> Vec<Vec<u8>> {
        events
            .iter()
            .filter_map(|e| match e {
                FramerEvent::Frame(f) => Some(f.as_bytes().to_vec()),
                FramerEvent::Resync(_) => None,
            })
            .collect()
    }

    #[test]
    fn emits_single_frame() {
        let input = hex!("C0 00 01 02 03 04 05 C0");
        let mut framer = Framer::new();
        let events = framer.push(&input);

        assert_eq!(frames(&events), vec![input.to_vec()]);
        assert_eq!(framer.frames_emitted(), 1);
        assert_eq!(framer.resyncs(), 0);
    }

    #[test]
    fn short_frame_resyncs() {
        let mut framer = Framer::new();
        let events = framer.push(&hex!("C0 00 C0"));

        assert_eq!(events, vec![FramerEvent::Resync(Anomaly::TooShort { len: 3 })]);
        assert_eq!(framer.resyncs(), 1);
        // The closing marker opened a new frame
        assert_eq!(framer.pending(), 1);
    }

    #[test]
    fn closing_marker_opens_next_frame() {
        // Second frame reuses the first frame's closing marker
        let input = hex!("C0 00 01 02 03 04 05 C0 00 0A 0B 0C 0D 0E C0");
        let mut framer = Framer::new();
        let events = framer.push(&input);

        assert_eq!(
            frames(&events),
            vec![hex!("C0 00 01 02 03 04 05 C0").to_vec(), hex!("C0 00 0A 0B 0C 0D 0E C0").to_vec()]
        );
    }

    #[test]
    fn back_to_back_markers_are_idle() {
        let input = hex!("C0 C0 C0 00 01 02 03 04 05 C0 C0 00 01 02 03 04 05 C0");
        let mut framer = Framer::new();
        let events = framer.push(&input);

        assert_eq!(frames(&events).len(), 2);
        assert_eq!(framer.resyncs(), 0);
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let mut framer = Framer::new();
        let events = framer.push(&hex!("11 22 33 C0 00 01 02 03 04 05 C0"));
        assert_eq!(frames(&events).len(), 1);
        assert_eq!(framer.resyncs(), 0);
    }

    #[test]
    fn wrong_discriminator_is_dropped() {
        let mut framer = Framer::new();
        let events = framer.push(&hex!("C0 07 01 02 03 04 05 C0"));
        assert_eq!(events, vec![FramerEvent::Resync(Anomaly::BadDiscriminator { found: 0x07 })]);
    }

    #[test]
    fn overflow_discards_and_recovers() {
        let mut framer = Framer::with_capacity(16);
        let mut input = vec![MARKER, PROTOCOL_ID];
        input.extend(std::iter::repeat_n(0x55, 30));
        input.extend_from_slice(&hex!("C0 00 01 02 03 04 05 C0"));

        let events = framer.push(&input);

        assert!(matches!(events[0], FramerEvent::Resync(Anomaly::Overflow { len: 17 })));
        assert_eq!(frames(&events), vec![hex!("C0 00 01 02 03 04 05 C0").to_vec()]);
        assert_eq!(framer.resyncs(), 1);
    }

    #[test]
    fn byte_at_a_time_matches_chunked() {
        let input = hex!("C0 00 01 02 03 04 05 C0 99 C0 00 0A 0B 0C 0D 0E C0");
        let mut chunked = Framer::new();
        let expected = chunked.push(&input);

        let mut single = Framer::new();
        let events: Vec<_> = input.iter().filter_map(|&b| single.push_byte(b)).collect();

        assert_eq!(events, expected);
    }

    fn frame_strategy() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>().prop_filter("no marker", |b| *b != MARKER), 4..40)
            .prop_map(|body| {
                let mut frame = vec![MARKER, PROTOCOL_ID];
                frame.extend(body);
                frame.push(MARKER);
                frame
            })
    }

    // Garbage never contains a marker and never looks like a frame start
    fn garbage_strategy() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(
            any::<u8>().prop_filter("no marker", |b| *b != MARKER && *b != PROTOCOL_ID),
            0..20,
        )
    }

    proptest! {
        #[test]
        fn prop_emits_exactly_valid_frames(
            parts in proptest::collection::vec((garbage_strategy(), frame_strategy()), 1..12),
        ) {
            let mut input = Vec::new();
            let mut expected = Vec::new();
            for (garbage, frame) in &parts {
                input.extend_from_slice(garbage);
                input.extend_from_slice(frame);
                expected.push(frame.clone());
            }

            let mut framer = Framer::new();
            let emitted = frames(&framer.push(&input));

            prop_assert_eq!(emitted, expected);
        }

        #[test]
        fn prop_never_emits_partial_frames(input in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut framer = Framer::with_capacity(64);
            for event in framer.push(&input) {
                if let FramerEvent::Frame(frame) = event {
                    prop_assert!(frame.len() >= MIN_FRAME_LEN);
                    prop_assert!(frame.len() <= 64);
                    prop_assert_eq!(&frame.as_bytes()[..2], &[MARKER, PROTOCOL_ID]);
                    prop_assert_eq!(frame.as_bytes()[frame.len() - 1], MARKER);
                }
            }
        }

        #[test]
        fn prop_output_is_subsequence_of_input(input in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut framer = Framer::new();
            let emitted: Vec<u8> = frames(&framer.push(&input)).concat();

            // Shared closing/opening markers may appear twice in the output, so
            // compare with markers stripped from both sides.
            let strip = |bytes: &[u8]| bytes.iter().copied().filter(|b| *b != MARKER).collect::<Vec<_>>();
            let emitted = strip(&emitted);
            let source = strip(&input);

            let mut it = source.iter();
            for byte in &emitted {
                prop_assert!(it.any(|b| b == byte));
            }
        }
    }
}
