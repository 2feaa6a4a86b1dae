//! Relay connector interface
//!
//! The group starts relay pulls and pushes through a `RelayConnector`. A
//! successful connect yields the session plus a one-shot completion signal
//! that fires when the session ends, with the reason it ended.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use super::capability::{MessageSink, Session, Subscriber};
use crate::config::RelayTimeouts;
use crate::error::RelayError;

/// Boxed `Send` future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fires once when a relay session ends
pub type DoneSignal = oneshot::Receiver<Result<(), RelayError>>;

/// An established relay session and its completion signal
pub struct Relay<S: ?Sized> {
    pub session: Arc<S>,
    pub done: DoneSignal,
}

impl<S: ?Sized> Relay<S> {
    pub fn new(session: Arc<S>, done: DoneSignal) -> Self {
        Self { session, done }
    }
}

/// Timeouts enforced by the relay session, not by the group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    pub connect_timeout: Duration,
    /// Time allowed for the publish/play handshake after connecting
    pub push_timeout: Duration,
    pub write_timeout: Duration,
}

impl From<&RelayTimeouts> for RelayOptions {
    fn from(t: &RelayTimeouts) -> Self {
        Self {
            connect_timeout: t.connect_timeout(),
            push_timeout: t.push_timeout(),
            write_timeout: t.write_timeout(),
        }
    }
}

/// Client side of relay pull and relay push
pub trait RelayConnector: Send + Sync {
    /// Connect to `url` and start playing; inbound messages go to `sink`
    fn pull(
        &self,
        url: String,
        options: RelayOptions,
        sink: Arc<dyn MessageSink>,
    ) -> BoxFuture<'static, Result<Relay<dyn Session>, RelayError>>;

    /// Connect to `url` and start publishing
    fn push(
        &self,
        url: String,
        options: RelayOptions,
    ) -> BoxFuture<'static, Result<Relay<dyn Subscriber>, RelayError>>;
}
