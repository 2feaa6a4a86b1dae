//! Media handling for the hub
//!
//! This module provides:
//! - The application-level message type and its classification
//! - FLV tag encoding for HTTP-FLV players
//! - Lazy per-message wire conversion
//! - GOP caching for late-joiner support

pub mod convert;
pub mod flv;
pub mod gop;
pub mod message;

pub use convert::{ChunkEncoder, Encoder, FlvTagEncoder, LazyConverter};
pub use gop::{Gop, GopCache};
pub use message::{AvHeader, AvMessage, MessageType};
