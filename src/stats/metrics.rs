//! Group snapshots

use std::fmt;

use crate::group::StreamKey;

/// Point-in-time view of one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStats {
    /// Process-unique group key
    pub unique_key: String,
    /// Stream identity
    pub key: StreamKey,
    /// Unique key of the attached publisher
    pub publisher: Option<String>,
    /// Unique key of the attached relay pull session
    pub puller: Option<String>,
    /// A relay pull attempt is connecting or attached
    pub pulling: bool,
    /// RTMP players
    pub rtmp_subscribers: usize,
    /// HTTP-FLV players
    pub httpflv_subscribers: usize,
    /// Configured relay push targets
    pub push_targets: usize,
    /// Push targets with an established session
    pub active_pushes: usize,
    /// Complete or open GOPs in the RTMP cache
    pub rtmp_gops: usize,
    /// Complete or open GOPs in the HTTP-FLV cache
    pub httpflv_gops: usize,
}

impl GroupStats {
    /// Total players across protocols
    pub fn subscriber_count(&self) -> usize {
        self.rtmp_subscribers + self.httpflv_subscribers
    }

    /// Whether any inbound source is attached
    pub fn has_source(&self) -> bool {
        self.publisher.is_some() || self.puller.is_some()
    }
}

impl fmt::Display for GroupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] stream={}, pub={}, pull={}, rtmp sub={}, httpflv sub={}, push={}/{}",
            self.unique_key,
            self.key,
            self.publisher.as_deref().unwrap_or("none"),
            self.puller.as_deref().unwrap_or("none"),
            self.rtmp_subscribers,
            self.httpflv_subscribers,
            self.active_pushes,
            self.push_targets,
        )
    }
}
