//! Session capabilities the group depends on
//!
//! The group never drives a session's I/O. Every session runs on its own task;
//! the group only holds an `Arc` to the capability surface below and talks to
//! it with non-blocking calls while its lock is held.

pub mod capability;
pub mod queue;
pub mod relay;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::atomic::{AtomicU64, Ordering};

pub use capability::{MessageSink, Muxer, MuxerFactory, Session, Subscriber, SubscriberKind};
pub use queue::QueuedSubscriber;
pub use relay::{BoxFuture, DoneSignal, Relay, RelayConnector, RelayOptions};

static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique key, e.g. `GROUP7`, `PUSH12`
pub fn gen_unique_key(prefix: &str) -> String {
    let id = NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed);
    format!("{}{}", prefix, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_keys_differ() {
        let a = gen_unique_key("SUB");
        let b = gen_unique_key("SUB");
        assert!(a.starts_with("SUB"));
        assert_ne!(a, b);
    }
}
