//! GOP (Group of Pictures) cache for late-joiner support
//!
//! When a new player attaches to a live stream it needs, in order:
//! 1. The latest metadata
//! 2. The sequence headers (AVC/HEVC decoder config, AudioSpecificConfig)
//! 3. One or more complete GOPs, each starting at a key frame
//!
//! A group keeps one cache per output wire format, so everything stored here
//! is already encoded and can be written to a player as-is.

use std::collections::VecDeque;

use bytes::Bytes;

use super::message::{AvMessage, MessageType};

/// Encoded blocks of one key-frame-aligned run of frames
#[derive(Debug, Clone, Default)]
pub struct Gop {
    blocks: Vec<Bytes>,
}

impl Gop {
    fn new(first: Bytes) -> Self {
        Self {
            blocks: vec![first],
        }
    }

    /// Encoded blocks in arrival order
    pub fn blocks(&self) -> &[Bytes] {
        &self.blocks
    }

    /// Total encoded size in bytes
    pub fn size(&self) -> usize {
        self.blocks.iter().map(Bytes::len).sum()
    }
}

/// Replay cache for one output wire format
#[derive(Debug)]
pub struct GopCache {
    /// Label used in logs ("rtmp", "httpflv")
    name: &'static str,
    /// Maximum number of buffered GOPs (0 disables GOP buffering)
    capacity: usize,
    metadata: Option<Bytes>,
    video_seq_header: Option<Bytes>,
    aac_seq_header: Option<Bytes>,
    /// Oldest first; the back entry is the open GOP
    gops: VecDeque<Gop>,
}

impl GopCache {
    /// Create a cache holding at most `capacity` GOPs
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            metadata: None,
            video_seq_header: None,
            aac_seq_header: None,
            gops: VecDeque::new(),
        }
    }

    /// Feed one message; `encoded` produces its bytes in this cache's format
    ///
    /// `encoded` is only called when the message is actually retained.
    pub fn feed<F>(&mut self, msg: &AvMessage, encoded: F)
    where
        F: FnOnce() -> Bytes,
    {
        match msg.msg_type() {
            MessageType::Metadata => {
                self.metadata = Some(encoded());
                return;
            }
            MessageType::Audio if msg.is_aac_seq_header() => {
                self.aac_seq_header = Some(encoded());
                return;
            }
            MessageType::Video if msg.is_video_seq_header() => {
                self.video_seq_header = Some(encoded());
                return;
            }
            _ => {}
        }

        if self.capacity == 0 {
            return;
        }

        if msg.is_video_key_nalu() {
            self.gops.push_back(Gop::new(encoded()));
            while self.gops.len() > self.capacity {
                self.gops.pop_front();
            }
            tracing::trace!(cache = self.name, gops = self.gops.len(), "New GOP");
        } else if let Some(open) = self.gops.back_mut() {
            open.blocks.push(encoded());
        }
        // No key frame seen since the last clear: nothing to attach the frame to
    }

    /// Drop every slot and every buffered GOP
    pub fn clear(&mut self) {
        self.metadata = None;
        self.video_seq_header = None;
        self.aac_seq_header = None;
        self.gops.clear();
    }

    /// Latest encoded metadata
    pub fn metadata(&self) -> Option<&Bytes> {
        self.metadata.as_ref()
    }

    /// Latest encoded video sequence header
    pub fn video_seq_header(&self) -> Option<&Bytes> {
        self.video_seq_header.as_ref()
    }

    /// Latest encoded AAC sequence header
    pub fn aac_seq_header(&self) -> Option<&Bytes> {
        self.aac_seq_header.as_ref()
    }

    /// Number of buffered GOPs
    pub fn gop_count(&self) -> usize {
        self.gops.len()
    }

    /// Encoded blocks of the GOP at `index` (0 is the oldest)
    pub fn gop_data_at(&self, index: usize) -> Option<&[Bytes]> {
        self.gops.get(index).map(Gop::blocks)
    }

    /// Configured GOP capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total encoded size of all buffered GOPs
    pub fn size(&self) -> usize {
        self.gops.iter().map(Gop::size).sum()
    }

    /// Everything a fresh consumer must receive before live data, in order:
    /// metadata, video sequence header, audio sequence header, then every
    /// GOP oldest to newest
    pub fn replay(&self) -> impl Iterator<Item = &Bytes> + '_ {
        self.metadata
            .iter()
            .chain(self.video_seq_header.iter())
            .chain(self.aac_seq_header.iter())
            .chain(self.gops.iter().flat_map(|gop| gop.blocks.iter()))
    }
}
