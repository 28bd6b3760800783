//! Scripted gateway behaviours.
//!
//! A [`Responder`] sees every chunk the client writes and returns the bytes
//! the gateway sends back. Returning nothing models a gateway that stays
//! silent.

use std::collections::VecDeque;

use slipwire_proto::{Frame, Packet};
use tracing::trace;

type Reply = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Gateway behaviour: request bytes in, response bytes out.
pub struct Responder {
    reply: Reply,
}

impl Responder {
    /// Custom behaviour.
    pub fn new(reply: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        Self { reply: Box::new(reply) }
    }

    /// Never answers.
    pub fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// Sends every request straight back.
    pub fn echo() -> Self {
        Self::new(<[u8]>::to_vec)
    }

    /// Answers every request with the same bytes.
    pub fn constant(response: impl Into<Vec<u8>>) -> Self {
        let response = response.into();
        Self::new(move |_| response.clone())
    }

    /// Answers requests with `responses` in order, then stays silent.
    pub fn script(responses: impl IntoIterator<Item = Vec<u8>>) -> Self {
        let mut responses: VecDeque<Vec<u8>> = responses.into_iter().collect();
        Self::new(move |_| responses.pop_front().unwrap_or_default())
    }

    /// Confirms every decodable packet with `command + 1` and the same data.
    ///
    /// Undecodable requests get no answer.
    pub fn confirm() -> Self {
        Self::new(|request| {
            let confirmation = Frame::new(request.to_vec())
                .and_then(|frame| Packet::decode(&frame))
                .and_then(|packet| {
                    Packet::new(packet.command.wrapping_add(1), packet.data).encode()
                });
            match confirmation {
                Ok(frame) => frame.as_bytes().to_vec(),
                Err(err) => {
                    trace!(error = %err, "not confirming undecodable request");
                    Vec::new()
                },
            }
        })
    }

    /// Response to one written chunk.
    pub fn respond(&mut self, request: &[u8]) -> Vec<u8> {
        (self.reply)(request)
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder").finish_non_exhaustive()
    }
}
