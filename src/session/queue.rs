//! Channel-backed subscriber
//!
//! Bridges the group's non-blocking `enqueue` to a session writer task: the
//! group `try_send`s into a bounded channel, the writer drains it onto the
//! socket at its own pace.
//!
//! ```text
//!   Group (lock held)                    writer task
//!   enqueue() ──try_send──► mpsc ──recv──► socket.write_all()
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::capability::{Session, Subscriber};

/// Subscriber whose outbound queue is a bounded `mpsc` channel
pub struct QueuedSubscriber {
    unique_key: String,
    tx: mpsc::Sender<Bytes>,
    fresh: AtomicBool,
    closed: CancellationToken,
    dropped: AtomicU64,
}

impl QueuedSubscriber {
    /// Create a subscriber and the receiver its writer task drains
    pub fn new(unique_key: impl Into<String>, capacity: usize) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sub = Arc::new(Self {
            unique_key: unique_key.into(),
            tx,
            fresh: AtomicBool::new(true),
            closed: CancellationToken::new(),
            dropped: AtomicU64::new(0),
        });
        (sub, rx)
    }

    /// Resolves once the group (or anyone else) disposed this subscriber
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Blocks rejected because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Session for QueuedSubscriber {
    fn unique_key(&self) -> &str {
        &self.unique_key
    }

    fn dispose(&self) {
        self.closed.cancel();
    }
}

impl Subscriber for QueuedSubscriber {
    fn enqueue(&self, data: Bytes) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }

        match self.tx.try_send(data) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn is_fresh(&self) -> bool {
        self.fresh.load(Ordering::Acquire)
    }

    fn mark_not_fresh(&self) {
        self.fresh.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_and_drain() {
        let (sub, mut rx) = QueuedSubscriber::new("SUB1", 4);

        assert!(sub.is_fresh());
        assert!(sub.enqueue(Bytes::from_static(b"a")));
        assert!(sub.enqueue(Bytes::from_static(b"b")));

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"b"));

        sub.mark_not_fresh();
        assert!(!sub.is_fresh());
    }

    #[test]
    fn test_full_queue_rejects() {
        let (sub, _rx) = QueuedSubscriber::new("SUB2", 1);

        assert!(sub.enqueue(Bytes::from_static(b"a")));
        assert!(!sub.enqueue(Bytes::from_static(b"b")));
        assert_eq!(sub.dropped(), 1);
    }

    #[test]
    fn test_closed_receiver_rejects() {
        let (sub, rx) = QueuedSubscriber::new("SUB3", 4);
        drop(rx);
        assert!(!sub.enqueue(Bytes::from_static(b"a")));
        assert_eq!(sub.dropped(), 0);
    }

    #[tokio::test]
    async fn test_dispose() {
        let (sub, _rx) = QueuedSubscriber::new("SUB4", 4);
        assert!(!sub.is_closed());

        sub.dispose();
        sub.closed().await;

        assert!(sub.is_closed());
        assert!(!sub.enqueue(Bytes::from_static(b"a")));
    }
}
