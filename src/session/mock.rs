//! Test doubles for sessions, muxers and relay connectors

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use super::capability::{MessageSink, Muxer, MuxerFactory, Session, Subscriber};
use super::queue::QueuedSubscriber;
use super::relay::{BoxFuture, Relay, RelayConnector, RelayOptions};
use crate::error::RelayError;
use crate::group::StreamKey;
use crate::media::AvMessage;

/// Publisher / puller stand-in
pub struct MockSession {
    key: String,
    disposed: AtomicBool,
}

impl MockSession {
    pub fn new(key: &str) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Session for MockSession {
    fn unique_key(&self) -> &str {
        &self.key
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

/// Route `tracing` output to the test harness; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Drain everything currently queued for a subscriber
pub fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Bytes> {
    let mut out = Vec::new();
    while let Ok(b) = rx.try_recv() {
        out.push(b);
    }
    out
}

/// Poll `cond` until it holds, panicking after two seconds
pub async fn eventually<F: Fn() -> bool>(cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Records muxer lifecycle calls as strings
#[derive(Default)]
pub struct MockMuxerFactory {
    pub events: Arc<Mutex<Vec<String>>>,
}

struct MockMuxer {
    events: Arc<Mutex<Vec<String>>>,
}

impl Muxer for MockMuxer {
    fn start(&mut self) {
        self.events.lock().unwrap().push("start".into());
    }

    fn feed(&mut self, msg: &AvMessage) {
        self.events
            .lock()
            .unwrap()
            .push(format!("feed:{}", msg.timestamp()));
    }

    fn dispose(&mut self) {
        self.events.lock().unwrap().push("dispose".into());
    }
}

impl MuxerFactory for MockMuxerFactory {
    fn create(&self, _key: &StreamKey) -> Box<dyn Muxer> {
        self.events.lock().unwrap().push("create".into());
        Box::new(MockMuxer {
            events: Arc::clone(&self.events),
        })
    }
}

/// How the mock connector answers a connect for one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    /// Never completes; only cancellation ends it
    Hang,
}

/// Scriptable relay connector
pub struct MockConnector {
    default: Behavior,
    per_url: Mutex<HashMap<String, Behavior>>,
    pub attempts: Mutex<Vec<String>>,
    pub pulls: Mutex<Vec<(Arc<MockSession>, Arc<dyn MessageSink>)>>,
    pub pushes: Mutex<HashMap<String, (Arc<QueuedSubscriber>, mpsc::Receiver<Bytes>)>>,
    done: Mutex<HashMap<String, oneshot::Sender<Result<(), RelayError>>>>,
    in_flight: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(default: Behavior) -> Arc<Self> {
        Arc::new(Self {
            default,
            per_url: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
            pulls: Mutex::new(Vec::new()),
            pushes: Mutex::new(HashMap::new()),
            done: Mutex::new(HashMap::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn set(&self, url: &str, behavior: Behavior) {
        self.per_url
            .lock()
            .unwrap()
            .insert(url.to_string(), behavior);
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// Connect futures that have started and not yet finished or been dropped
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Fire the completion signal of the latest session for `url`
    pub fn finish(&self, url: &str, outcome: Result<(), RelayError>) -> bool {
        match self.done.lock().unwrap().remove(url) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    fn begin(&self, url: &str) -> (Behavior, InFlight) {
        self.attempts.lock().unwrap().push(url.to_string());
        let behavior = self
            .per_url
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .unwrap_or(self.default);
        (behavior, InFlight::new(Arc::clone(&self.in_flight)))
    }

    fn done_signal(&self, url: &str) -> oneshot::Receiver<Result<(), RelayError>> {
        let (tx, rx) = oneshot::channel();
        self.done.lock().unwrap().insert(url.to_string(), tx);
        rx
    }
}

/// Counts a connect future as in flight until it is dropped
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RelayConnector for MockConnector {
    fn pull(
        &self,
        url: String,
        _options: RelayOptions,
        sink: Arc<dyn MessageSink>,
    ) -> BoxFuture<'static, Result<Relay<dyn Session>, RelayError>> {
        let (behavior, guard) = self.begin(&url);
        let result = match behavior {
            Behavior::Succeed => {
                let session = MockSession::new(&format!("PULL-{}", url));
                self.pulls
                    .lock()
                    .unwrap()
                    .push((Arc::clone(&session), sink));
                let done = self.done_signal(&url);
                let session: Arc<dyn Session> = session;
                Some(Ok(Relay::new(session, done)))
            }
            Behavior::Fail => Some(Err(RelayError::Connect(format!("refused: {}", url)))),
            Behavior::Hang => None,
        };

        Box::pin(async move {
            let _guard = guard;
            match result {
                Some(r) => {
                    tokio::task::yield_now().await;
                    r
                }
                None => std::future::pending().await,
            }
        })
    }

    fn push(
        &self,
        url: String,
        _options: RelayOptions,
    ) -> BoxFuture<'static, Result<Relay<dyn Subscriber>, RelayError>> {
        let (behavior, guard) = self.begin(&url);
        let result = match behavior {
            Behavior::Succeed => {
                let (session, rx) = QueuedSubscriber::new(format!("PUSH-{}", url), 1024);
                self.pushes
                    .lock()
                    .unwrap()
                    .insert(url.clone(), (Arc::clone(&session), rx));
                let done = self.done_signal(&url);
                let session: Arc<dyn Subscriber> = session;
                Some(Ok(Relay::new(session, done)))
            }
            Behavior::Fail => Some(Err(RelayError::Connect(format!("refused: {}", url)))),
            Behavior::Hang => None,
        };

        Box::pin(async move {
            let _guard = guard;
            match result {
                Some(r) => {
                    tokio::task::yield_now().await;
                    r
                }
                None => std::future::pending().await,
            }
        })
    }
}
