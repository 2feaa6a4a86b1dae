//! Error types
//!
//! Errors surfaced by the group hub and by relay collaborators.

use crate::group::StreamKey;

/// Result type for group operations
pub type Result<T> = std::result::Result<T, GroupError>;

/// Error type for group attach operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum GroupError {
    /// A publisher is already attached to the stream
    #[error("stream already has a publisher: {key} (existing={existing})")]
    PublisherExists { key: StreamKey, existing: String },

    /// The inbound slot is held by another source kind (publisher vs. relay pull)
    #[error("stream inbound busy: {key} (held by {holder})")]
    InboundBusy { key: StreamKey, holder: String },

    /// Relay push attach while no publisher feeds the stream
    #[error("stream not publishing: {0}")]
    NotPublishing(StreamKey),

    /// Relay push attach for a URL that is not a configured target
    #[error("unknown relay target: {0}")]
    UnknownRelayTarget(String),

    /// The group was disposed
    #[error("group disposed: {0}")]
    Disposed(StreamKey),
}

/// Outcome of a relay connect attempt or of a relay session's lifetime
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Could not establish the relay session
    #[error("relay connect failed: {0}")]
    Connect(String),

    /// A relay timeout fired (connect, publish/play or write)
    #[error("relay timed out: {0}")]
    Timeout(String),

    /// The remote end or the transport closed the session
    #[error("relay session closed: {0}")]
    Closed(String),

    /// The attempt was cancelled locally
    #[error("relay cancelled")]
    Cancelled,
}
