//! Capability traits

use bytes::Bytes;

use crate::group::StreamKey;
use crate::media::AvMessage;

/// Anything the group can hold a reference to and tear down
pub trait Session: Send + Sync {
    /// Stable identity, used for set membership and logs
    fn unique_key(&self) -> &str;

    /// Stop the session's I/O task; must not block
    fn dispose(&self);
}

/// A consumer of broadcast data
///
/// Implemented by RTMP players, HTTP-FLV players and relay push sessions alike,
/// so the fan-out loop is written once.
pub trait Subscriber: Session {
    /// Queue already-encoded bytes for the session's writer
    ///
    /// Must not block. Returns `false` if the bytes were rejected (queue full
    /// or session closed); the group ignores the result.
    fn enqueue(&self, data: Bytes) -> bool;

    /// Whether the session has not yet received its cache replay
    fn is_fresh(&self) -> bool;

    fn mark_not_fresh(&self);
}

/// Player kind, selects which output format and cache a subscriber gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberKind {
    /// RTMP chunk stream
    Rtmp,
    /// Progressive HTTP-FLV
    HttpFlv,
}

impl std::fmt::Display for SubscriberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriberKind::Rtmp => write!(f, "rtmp"),
            SubscriberKind::HttpFlv => write!(f, "httpflv"),
        }
    }
}

/// Receiver of inbound media, handed to publishers and relay pullers
pub trait MessageSink: Send + Sync {
    fn on_av_message(&self, msg: AvMessage);
}

/// External segment writer (e.g. HLS) fed with every raw inbound message
pub trait Muxer: Send {
    fn start(&mut self);

    fn feed(&mut self, msg: &AvMessage);

    fn dispose(&mut self);
}

/// Creates one muxer per inbound epoch
pub trait MuxerFactory: Send + Sync {
    fn create(&self, key: &StreamKey) -> Box<dyn Muxer>;
}
