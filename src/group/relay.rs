//! Relay pull / push supervision
//!
//! Each relay attempt walks the same path:
//!
//! ```text
//! Idle ──► Connecting ──► Attached ──► Detached ──► Idle
//!  (flag set)  │      (epoch runs)  (flag cleared, caches cleared)
//!              └──── connect failed ────────────────► Idle
//! ```
//!
//! The in-flight flag is set under the group lock before the connect task is
//! spawned, so concurrent `tick`s never start a second attempt. Connect tasks
//! never hold the lock while connecting; they take it only to attach and
//! detach. There is no retry timer: the next `tick` re-evaluates.

use std::sync::{Arc, OnceLock, Weak};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::hub::{Group, GroupState, Inbound};
use crate::error::{GroupError, RelayError, Result};
use crate::media::AvMessage;
use crate::session::{DoneSignal, MessageSink, RelayConnector, RelayOptions, Session, Subscriber};

/// One configured relay push destination
pub(crate) struct RelayTarget {
    /// A push attempt is connecting or attached
    pub(super) pushing: bool,
    pub(super) session: Option<Arc<dyn Subscriber>>,
    /// Cancels the current attempt's task
    attempt: Option<CancellationToken>,
}

impl RelayTarget {
    pub(super) fn new() -> Self {
        Self {
            pushing: false,
            session: None,
            attempt: None,
        }
    }

    pub(super) fn is_attached(&self) -> bool {
        self.session.is_some()
    }

    /// Dispose the attached session and stop the attempt task
    ///
    /// `pushing` stays set until the task itself reports back.
    pub(super) fn detach_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.dispose();
        }
        if let Some(attempt) = &self.attempt {
            attempt.cancel();
        }
    }
}

/// Sink handed to one relay pull attempt
///
/// Holds the group weakly and forwards only once bound to the attempt's
/// session; the group then drops whatever that session sends while it is not
/// the attached puller.
struct PullSink {
    group: Weak<Group>,
    session: OnceLock<String>,
}

impl PullSink {
    fn new(group: Weak<Group>) -> Self {
        Self {
            group,
            session: OnceLock::new(),
        }
    }

    fn bind(&self, session: &str) {
        let _ = self.session.set(session.to_string());
    }
}

impl MessageSink for PullSink {
    fn on_av_message(&self, msg: AvMessage) {
        let Some(session) = self.session.get() else {
            return;
        };
        if let Some(group) = self.group.upgrade() {
            group.on_pulled_message(session, msg);
        }
    }
}

impl Group {
    /// Start a relay pull if the stream has players but no source
    pub(super) fn pull_if_needed(&self, state: &mut GroupState) {
        if !self.config.relay_pull.enabled {
            return;
        }
        if !state.has_subscribers() {
            return;
        }
        if !matches!(state.inbound, Inbound::None) {
            return;
        }
        if state.pulling {
            return;
        }

        let Some(connector) = self.connector.clone() else {
            tracing::warn!(group = %self.unique_key(), "Relay pull enabled without a connector");
            return;
        };
        let Some(group) = self.this.upgrade() else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            tracing::error!(group = %self.unique_key(), "Relay pull needs a tokio runtime");
            return;
        };

        state.pulling = true;

        let url = self.key().relay_url(&self.config.relay_pull.addr);
        let options = RelayOptions::from(&self.config.relay_timeouts);
        let cancel = self.shutdown.child_token();
        tracing::info!(group = %self.unique_key(), url = %url, "Start relay pull");

        handle.spawn(run_pull(group, connector, url, options, cancel));
    }

    /// Start a relay push for every idle target while a publisher is attached
    pub(super) fn push_if_needed(&self, state: &mut GroupState) {
        if !self.config.relay_push.enabled {
            return;
        }
        if !matches!(state.inbound, Inbound::Publisher(_)) {
            return;
        }

        let Some(connector) = &self.connector else {
            tracing::warn!(group = %self.unique_key(), "Relay push enabled without a connector");
            return;
        };
        let Some(group) = self.this.upgrade() else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            tracing::error!(group = %self.unique_key(), "Relay push needs a tokio runtime");
            return;
        };

        let options = RelayOptions::from(&self.config.relay_timeouts);
        for (url, target) in state.push_targets.iter_mut() {
            if target.pushing {
                continue;
            }
            target.pushing = true;

            let cancel = self.shutdown.child_token();
            target.attempt = Some(cancel.clone());
            tracing::info!(group = %self.unique_key(), url = %url, "Start relay push");

            handle.spawn(run_push(
                Arc::clone(&group),
                Arc::clone(connector),
                url.clone(),
                options,
                cancel,
            ));
        }
    }

    /// Install an established push session on its target
    pub fn attach_push_relay(&self, url: &str, session: Arc<dyn Subscriber>) -> Result<()> {
        let mut state = self.state();
        if state.disposed {
            return Err(GroupError::Disposed(self.key().clone()));
        }

        let publishing = matches!(state.inbound, Inbound::Publisher(_));
        let Some(target) = state.push_targets.get_mut(url) else {
            return Err(GroupError::UnknownRelayTarget(url.to_string()));
        };

        let cancelled = target
            .attempt
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false);
        if !publishing || cancelled {
            return Err(GroupError::NotPublishing(self.key().clone()));
        }

        tracing::debug!(
            group = %self.unique_key(),
            session = session.unique_key(),
            url = %url,
            "Push relay attached"
        );
        if let Some(old) = target.session.replace(session) {
            tracing::warn!(url = %url, old = old.unique_key(), "Replaced push session");
            old.dispose();
        }
        target.pushing = true;

        Ok(())
    }

    /// Detach a push session from its target
    ///
    /// Ignored unless `session` is the target's current session. The target
    /// stays in flight until the attempt task behind it has wound down.
    pub fn detach_push_relay(&self, url: &str, session: &dyn Session) {
        let mut state = self.state();
        let Some(target) = state.push_targets.get_mut(url) else {
            return;
        };

        match &target.session {
            Some(current) if current.unique_key() == session.unique_key() => {}
            _ => {
                tracing::debug!(
                    group = %self.unique_key(),
                    session = session.unique_key(),
                    url = %url,
                    "Detach of non-attached push session ignored"
                );
                return;
            }
        }

        target.session = None;
        tracing::debug!(group = %self.unique_key(), url = %url, "Push relay detached");

        match &target.attempt {
            Some(attempt) => attempt.cancel(),
            None => target.pushing = false,
        }
    }

    /// Called by a push attempt task once it is done with its target
    fn finish_push_attempt(&self, url: &str, session: Option<&dyn Session>) {
        let mut state = self.state();
        let Some(target) = state.push_targets.get_mut(url) else {
            return;
        };

        if let (Some(current), Some(s)) = (&target.session, session) {
            if current.unique_key() == s.unique_key() {
                target.session = None;
                tracing::debug!(group = %self.unique_key(), url = %url, "Push relay detached");
            }
        }
        target.pushing = false;
        target.attempt = None;
    }

    fn finish_failed_pull(&self) {
        self.state().pulling = false;
    }
}

async fn wait_done(done: DoneSignal, cancel: &CancellationToken) -> std::result::Result<(), RelayError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        outcome = done => outcome.unwrap_or_else(|_| {
            Err(RelayError::Closed("completion signal dropped".into()))
        }),
    }
}

async fn run_pull(
    group: Arc<Group>,
    connector: Arc<dyn RelayConnector>,
    url: String,
    options: RelayOptions,
    cancel: CancellationToken,
) {
    let sink = Arc::new(PullSink::new(Arc::downgrade(&group)));
    let connect = connector.pull(url.clone(), options, sink.clone());
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        r = connect => r,
    };

    let relay = match connected {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!(group = %group.unique_key(), url = %url, error = %e, "Relay pull failed");
            group.finish_failed_pull();
            return;
        }
    };

    let session = relay.session;
    sink.bind(session.unique_key());
    if let Err(e) = group.attach_puller(Arc::clone(&session)) {
        tracing::warn!(group = %group.unique_key(), url = %url, error = %e, "Relay pull not attached");
        session.dispose();
        group.finish_failed_pull();
        return;
    }

    let outcome = wait_done(relay.done, &cancel).await;
    tracing::info!(
        group = %group.unique_key(),
        session = session.unique_key(),
        outcome = ?outcome,
        "Relay pull done"
    );
    group.detach_puller(session.as_ref());
}

async fn run_push(
    group: Arc<Group>,
    connector: Arc<dyn RelayConnector>,
    url: String,
    options: RelayOptions,
    cancel: CancellationToken,
) {
    let connect = connector.push(url.clone(), options);
    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        r = connect => r,
    };

    let relay = match connected {
        Ok(relay) => relay,
        Err(e) => {
            tracing::error!(group = %group.unique_key(), url = %url, error = %e, "Relay push failed");
            group.finish_push_attempt(&url, None);
            return;
        }
    };

    let session = relay.session;
    if let Err(e) = group.attach_push_relay(&url, Arc::clone(&session)) {
        tracing::warn!(group = %group.unique_key(), url = %url, error = %e, "Relay push not attached");
        session.dispose();
        group.finish_push_attempt(&url, None);
        return;
    }

    let outcome = wait_done(relay.done, &cancel).await;
    tracing::info!(
        group = %group.unique_key(),
        session = session.unique_key(),
        outcome = ?outcome,
        "Relay push done"
    );
    group.finish_push_attempt(&url, Some(session.as_ref()));
}
