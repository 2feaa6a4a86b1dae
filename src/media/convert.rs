//! Lazy per-message wire conversion
//!
//! A message broadcast to N consumers of the same wire family must be
//! encoded once, not N times. `LazyConverter` wraps one message and one
//! encoder and runs the encoder on the first `get()` only; every later call
//! hands out the same reference-counted buffer.

use std::cell::OnceCell;

use bytes::Bytes;

use super::flv;
use super::message::AvMessage;
use crate::protocol::chunk;

/// Converts a message into the bytes one wire family expects
pub trait Encoder {
    fn encode(&self, msg: &AvMessage) -> Bytes;
}

/// RTMP chunk stream encoding, for RTMP players and relay push targets
#[derive(Debug, Clone, Copy)]
pub struct ChunkEncoder {
    pub chunk_size: u32,
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self {
            chunk_size: chunk::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Encoder for ChunkEncoder {
    fn encode(&self, msg: &AvMessage) -> Bytes {
        chunk::encode_message(&msg.header, &msg.payload, self.chunk_size)
    }
}

/// FLV tag encoding, for progressive HTTP-FLV players
#[derive(Debug, Clone, Copy, Default)]
pub struct FlvTagEncoder;

impl Encoder for FlvTagEncoder {
    fn encode(&self, msg: &AvMessage) -> Bytes {
        flv::encode_tag(msg)
    }
}

/// Encodes `msg` on first use and caches the result
pub struct LazyConverter<'a, E: Encoder + ?Sized> {
    msg: &'a AvMessage,
    encoder: &'a E,
    out: OnceCell<Bytes>,
}

impl<'a, E: Encoder + ?Sized> LazyConverter<'a, E> {
    pub fn new(msg: &'a AvMessage, encoder: &'a E) -> Self {
        Self {
            msg,
            encoder,
            out: OnceCell::new(),
        }
    }

    /// Encoded bytes, computed at most once
    pub fn get(&self) -> Bytes {
        self.out
            .get_or_init(|| self.encoder.encode(self.msg))
            .clone()
    }

    /// Whether the encoder has run yet
    pub fn is_initialized(&self) -> bool {
        self.out.get().is_some()
    }
}
