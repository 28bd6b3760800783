//! Request/response exchange tests.
//!
//! Drive the real client over the in-memory gateway and check what callers
//! observe for the happy path and for each kind of empty response:
//! - A request gets the gateway's next frame
//! - An empty request with nothing queued is a normal, empty poll
//! - A request that gets no answer is a send-then-silence timeout
//! - Line noise around frames never reaches the caller

use std::{
    thread,
    time::{Duration, Instant},
};

use slipwire_core::{Clock, Client, Frame, Packet, SessionState, TransportConfig, TransportError};
use slipwire_harness::{ManualClock, MemoryTransport, Responder, noise};

const EXAMPLE_FRAME: [u8; 8] = [0xC0, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0xC0];

fn config() -> TransportConfig {
    TransportConfig::new("gateway.local", 51200)
        .with_steady_state_timeout(Duration::from_millis(20))
        .with_response_timeout(Duration::from_millis(300))
        .with_backoff_base(Duration::from_millis(100))
        .with_retries(3)
        .with_stop_timeout(Duration::from_secs(5))
}

fn client(responder: Responder) -> (Client<MemoryTransport, ManualClock>, MemoryTransport, ManualClock) {
    let transport = MemoryTransport::new(responder);
    let clock = ManualClock::default();
    let client = Client::with_clock(transport.clone(), config(), clock.clone()).unwrap();
    (client, transport, clock)
}

fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn request_returns_next_frame() {
    let (client, transport, _clock) = client(Responder::constant(EXAMPLE_FRAME));

    let response = client.io(b"\x01\x02").unwrap().unwrap();

    assert_eq!(response.as_bytes(), &EXAMPLE_FRAME);
    assert_eq!(transport.last_stream().unwrap().written(), b"\x01\x02");
    assert!(client.is_alive());
    assert_eq!(client.health().state, SessionState::Ready);
    assert_eq!(transport.connect_attempts(), 1);
}

#[test]
fn session_is_reused_across_calls() {
    let (client, transport, _clock) = client(Responder::constant(EXAMPLE_FRAME));

    for _ in 0..5 {
        assert!(client.io(b"\x01").unwrap().is_some());
    }

    assert_eq!(transport.connections(), 1);
    assert_eq!(client.health().stats.frames_received, 5);
}

#[test]
fn empty_request_without_message_is_not_an_error() {
    let (client, transport, clock) = client(Responder::silent());

    assert_eq!(client.io(&[]).unwrap(), None);

    assert!(client.is_alive());
    assert!(transport.last_stream().unwrap().written().is_empty());
    assert!(clock.sleeps().is_empty());
    assert_eq!(client.last_successful_communication(), None);
    assert!(client.last_communication().is_some());
}

#[test]
fn empty_request_picks_up_unsolicited_frame() {
    let (client, transport, _clock) = client(Responder::silent());
    assert_eq!(client.poll().unwrap(), None);

    transport.last_stream().unwrap().inject(&EXAMPLE_FRAME);
    wait_until(|| client.is_message_available());

    let frame = client.poll().unwrap().unwrap();
    assert_eq!(frame.as_bytes(), &EXAMPLE_FRAME);
    assert!(!client.is_message_available());
}

#[test]
fn silence_after_send_is_retried_then_surfaced() {
    let (client, transport, clock) = client(Responder::silent());

    let err = client.io(b"\x01").unwrap_err();

    assert!(matches!(err, TransportError::RetriesExhausted { attempts: 3, .. }));
    assert!(matches!(err.root(), TransportError::SilentAfterSend(_)));
    // Every failed attempt resets the session
    assert_eq!(transport.connections(), 3);
    assert!(transport.streams().iter().all(|stream| stream.is_closed()));
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
    assert!(!client.is_alive());
}

#[test]
fn unsolicited_frame_answers_the_next_request() {
    let (client, transport, _clock) = client(Responder::silent());
    client.poll().unwrap();

    let stream = transport.last_stream().unwrap();
    stream.inject(&EXAMPLE_FRAME);
    wait_until(|| client.is_message_available());

    // One outstanding request at a time: whatever is queued comes back first
    let response = client.io(b"\x09").unwrap().unwrap();
    assert_eq!(response.as_bytes(), &EXAMPLE_FRAME);
    assert_eq!(stream.written(), b"\x09");
}

#[test]
fn noise_around_frames_is_dropped() {
    let frames: Vec<Frame> = (0..8u16)
        .map(|n| Packet::new(0x0100 + n, vec![n as u8; n as usize]).encode().unwrap())
        .collect();
    let (client, transport, _clock) = client(Responder::silent());
    client.poll().unwrap();

    transport.last_stream().unwrap().inject(&noise::interleave(42, &frames, 48));

    let received: Vec<Frame> = (0..frames.len()).map(|_| client.poll().unwrap().unwrap()).collect();
    assert_eq!(received, frames);
    assert_eq!(client.poll().unwrap(), None);
}

#[test]
fn too_short_frame_is_never_delivered() {
    let (client, transport, _clock) = client(Responder::silent());
    client.poll().unwrap();

    let stream = transport.last_stream().unwrap();
    stream.inject(&[0xC0, 0x00, 0xC0]);
    stream.inject(&EXAMPLE_FRAME);

    let frame = client.poll().unwrap().unwrap();
    assert_eq!(frame.as_bytes(), &EXAMPLE_FRAME);
    assert_eq!(client.health().stats.anomalies, 1);
}

#[test]
fn packet_request_decodes_confirmation() {
    let (client, _transport, _clock) = client(Responder::confirm());

    let confirmation = client.request(&Packet::new(0x000C, vec![0xC0, 0xDB, 0x07])).unwrap();

    assert_eq!(confirmation, Some(Packet::new(0x000D, vec![0xC0, 0xDB, 0x07])));
}

#[test]
fn undecodable_response_is_not_retried() {
    // Valid frame, but its length byte does not match the body
    let (client, transport, clock) = client(Responder::constant(EXAMPLE_FRAME));

    let err = client.request(&Packet::new(0x0001, Vec::new())).unwrap_err();

    assert!(matches!(err, TransportError::Protocol(_)));
    assert_eq!(transport.connect_attempts(), 1);
    assert!(clock.sleeps().is_empty());
}

#[test]
fn timestamps_never_move_backwards() {
    let (client, _transport, clock) = client(Responder::constant(EXAMPLE_FRAME));

    client.io(b"\x01").unwrap();
    let first = client.last_successful_communication().unwrap();
    assert_eq!(first, clock.now());
    assert_eq!(client.last_communication(), Some(first));

    clock.set(first - Duration::from_secs(3600));
    client.io(b"\x01").unwrap();

    assert_eq!(client.last_successful_communication(), Some(first));
    assert_eq!(client.last_communication(), Some(first));

    clock.set(first + Duration::from_secs(10));
    client.io(b"\x01").unwrap();
    assert_eq!(client.last_successful_communication(), Some(first + Duration::from_secs(10)));
}

#[test]
fn failed_exchange_only_moves_last_communication() {
    let transport = MemoryTransport::new(Responder::constant(EXAMPLE_FRAME));
    let clock = ManualClock::default();
    let client =
        Client::with_clock(transport.clone(), config().with_retries(1), clock.clone()).unwrap();

    client.io(b"\x01").unwrap();
    let success = client.last_successful_communication().unwrap();

    transport.set_responder(Responder::silent());
    clock.advance(Duration::from_secs(30));
    client.io(b"\x01").unwrap_err();

    assert_eq!(client.last_successful_communication(), Some(success));
    assert_eq!(client.last_communication(), Some(success + Duration::from_secs(30)));
    assert_eq!(client.health().silence(), Some(Duration::from_secs(30)));
}
