//! Session hub for live RTMP / HTTP-FLV relay servers
//!
//! Every stream is served by one [`Group`]. A group takes media from exactly
//! one inbound source, a local publisher or a relay pull from an origin, and
//! fans it out to RTMP players, HTTP-FLV players and relay push targets. Late
//! joiners are primed from a per-protocol GOP cache, and relay pull / push is
//! re-evaluated on a periodic tick.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<GroupManager>
//!                  ┌────────────────────────────┐
//!                  │ groups: HashMap<StreamKey, │
//!                  │   Arc<Group>>              │──── tick task ──► tick_all()
//!                  └─────────────┬──────────────┘
//!                                │
//!                  ┌─────────────▼──────────────┐
//!  [Publisher] ───►│ Group                      │───► [RTMP player]    chunked
//!      or          │   inbound slot             │───► [HTTP-FLV player] tagged
//!  [Relay pull] ──►│   rtmp / httpflv GopCache  │───► [Relay push]     chunked
//!                  │   muxer (HLS)              │───► Muxer::feed()
//!                  └────────────────────────────┘
//! ```
//!
//! Sessions, muxers and relay transports are outside this crate; the group
//! sees them only through the traits in [`session`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtmp_hub::{GroupConfig, GroupDeps, GroupManager, QueuedSubscriber, SubscriberKind};
//!
//! #[tokio::main]
//! async fn main() -> rtmp_hub::Result<()> {
//!     let manager = Arc::new(GroupManager::new(GroupConfig::default(), GroupDeps::default()));
//!     let _ticker = manager.spawn_tick_task();
//!
//!     let group = manager.get_or_create("live", "cam1").await;
//!     let (player, mut rx) = QueuedSubscriber::new("SUB1", 1024);
//!     group.add_subscriber(SubscriberKind::HttpFlv, player)?;
//!
//!     while let Some(data) = rx.recv().await {
//!         // write `data` to the player's socket
//!         let _ = data;
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod group;
pub mod media;
pub mod protocol;
pub mod session;
pub mod stats;

pub use config::GroupConfig;
pub use error::{GroupError, RelayError, Result};
pub use group::{Group, GroupDeps, GroupManager, StreamKey};
pub use media::{AvMessage, MessageType};
pub use session::{
    MessageSink, Muxer, MuxerFactory, QueuedSubscriber, RelayConnector, Session, Subscriber,
    SubscriberKind,
};
pub use stats::GroupStats;
