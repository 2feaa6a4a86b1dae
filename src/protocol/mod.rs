//! Wire-level helpers for outbound RTMP
//!
//! Only the chunk writer lives here; handshake, AMF and inbound chunk
//! reassembly belong to the session implementations.

pub mod chunk;

pub use chunk::{encode_message, DEFAULT_CHUNK_SIZE};
