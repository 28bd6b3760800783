//! Bounded frame queue between the reader thread and the caller.
//!
//! Single producer (the reader), single consumer (the client). When full, the
//! oldest frame is evicted: a fresh unsolicited message is more useful than a
//! stale one nobody picked up. FIFO order is preserved for everything that
//! stays in the queue.
//!
//! Waiting uses a condition variable rather than polling, so a frame pushed by
//! the reader wakes a blocked [`FrameQueue::pop_timeout`] immediately.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use slipwire_proto::Frame;

/// Result of waiting on the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pop {
    /// Oldest queued frame
    Frame(Frame),
    /// Nothing arrived before the deadline
    Empty,
    /// Producer is gone and the queue is drained
    Closed,
}

#[derive(Debug)]
struct State {
    frames: VecDeque<Frame>,
    closed: bool,
    evicted: u64,
}

/// Thread-safe bounded FIFO with drop-oldest overflow.
#[derive(Debug)]
pub struct FrameQueue {
    capacity: usize,
    state: Mutex<State>,
    ready: Condvar,
}

impl FrameQueue {
    /// Queue holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(State {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
                evicted: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Append a frame, evicting and returning the oldest one if full.
    pub fn push(&self, frame: Frame) -> Option<Frame> {
        let mut state = self.state.lock();
        let evicted = if state.frames.len() >= self.capacity {
            state.evicted += 1;
            state.frames.pop_front()
        } else {
            None
        };
        state.frames.push_back(frame);
        drop(state);

        self.ready.notify_one();
        evicted
    }

    /// Take the oldest frame without waiting.
    pub fn try_pop(&self) -> Option<Frame> {
        self.state.lock().frames.pop_front()
    }

    /// Take the oldest frame, waiting up to `timeout` for one to arrive.
    ///
    /// Frames already queued are delivered even after [`FrameQueue::close`];
    /// `Closed` is only returned once the queue is drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        loop {
            if let Some(frame) = state.frames.pop_front() {
                return Pop::Frame(frame);
            }
            if state.closed {
                return Pop::Closed;
            }

            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut state, deadline).timed_out() {
                        return state.frames.pop_front().map_or(Pop::Empty, Pop::Frame);
                    }
                },
                None => self.ready.wait(&mut state),
            }
        }
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().frames.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().frames.is_empty()
    }

    /// Maximum number of queued frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted because the queue was full.
    pub fn evicted(&self) -> u64 {
        self.state.lock().evicted
    }

    /// Drop every queued frame, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state.frames.len();
        state.frames.clear();
        discarded
    }

    /// Mark the producer as gone and wake every waiter.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    /// Whether [`FrameQueue::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
