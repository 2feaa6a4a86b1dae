//! Per-stream hub
//!
//! A `Group` multiplexes one inbound source (a local publisher or a relay
//! puller) out to every RTMP player, HTTP-FLV player and relay push target of
//! one stream. All state sits behind a single mutex that is held for the whole
//! of every public operation, fan-out included, so consumer delivery must be
//! a non-blocking enqueue.
//!
//! ```text
//!  publisher / puller task
//!        │ on_message(msg)
//!        ▼
//!  ┌──────────── Group (locked) ─────────────┐
//!  │ chunked = lazy(ChunkEncoder, msg)       │
//!  │ tagged  = lazy(FlvTagEncoder, msg)      │
//!  │ rtmp subs ─┐                            │
//!  │ push relays├─ replay rtmp cache if fresh│──► enqueue(chunked)
//!  │ flv subs ──┴─ replay flv cache if fresh │──► enqueue(tagged)
//!  │ rtmp cache.feed(chunked)                │
//!  │ flv cache.feed(tagged)                  │
//!  │ muxer.feed(msg)                         │
//!  └─────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio_util::sync::CancellationToken;

use super::key::StreamKey;
use super::relay::RelayTarget;
use crate::config::GroupConfig;
use crate::error::{GroupError, Result};
use crate::media::{flv, AvMessage, ChunkEncoder, Encoder, FlvTagEncoder, GopCache, LazyConverter};
use crate::session::{
    gen_unique_key, MessageSink, Muxer, MuxerFactory, RelayConnector, Session, Subscriber,
    SubscriberKind,
};
use crate::stats::GroupStats;

/// The group's single inbound source slot
pub(super) enum Inbound {
    None,
    Publisher(Arc<dyn Session>),
    Puller(Arc<dyn Session>),
}

impl Inbound {
    fn describe(&self) -> String {
        match self {
            Inbound::None => "none".into(),
            Inbound::Publisher(s) => format!("publisher {}", s.unique_key()),
            Inbound::Puller(s) => format!("puller {}", s.unique_key()),
        }
    }
}

/// Everything guarded by the group lock
pub(super) struct GroupState {
    pub(super) inbound: Inbound,
    pub(super) rtmp_subs: HashMap<String, Arc<dyn Subscriber>>,
    pub(super) httpflv_subs: HashMap<String, Arc<dyn Subscriber>>,
    /// Keyed by relay push URL
    pub(super) push_targets: HashMap<String, RelayTarget>,
    /// A relay pull attempt is connecting or attached
    pub(super) pulling: bool,
    pub(super) disposed: bool,
    muxer: Option<Box<dyn Muxer>>,
    rtmp_cache: GopCache,
    httpflv_cache: GopCache,
}

impl GroupState {
    fn subs_mut(&mut self, kind: SubscriberKind) -> &mut HashMap<String, Arc<dyn Subscriber>> {
        match kind {
            SubscriberKind::Rtmp => &mut self.rtmp_subs,
            SubscriberKind::HttpFlv => &mut self.httpflv_subs,
        }
    }

    pub(super) fn has_subscribers(&self) -> bool {
        !self.rtmp_subs.is_empty() || !self.httpflv_subs.is_empty()
    }

    fn clear_caches(&mut self) {
        self.rtmp_cache.clear();
        self.httpflv_cache.clear();
    }
}

/// Optional collaborators of a group
#[derive(Clone, Default)]
pub struct GroupDeps {
    /// Needed for relay pull / push; relays stay idle without one
    pub connector: Option<Arc<dyn RelayConnector>>,
    /// Needed for HLS; no muxer is started without one
    pub muxer_factory: Option<Arc<dyn MuxerFactory>>,
}

/// Hub for a single stream
pub struct Group {
    key: StreamKey,
    unique_key: String,
    pub(super) config: Arc<GroupConfig>,
    pub(super) connector: Option<Arc<dyn RelayConnector>>,
    muxer_factory: Option<Arc<dyn MuxerFactory>>,
    chunk_encoder: ChunkEncoder,
    state: Mutex<GroupState>,
    /// Termination signal; relay tasks run on child tokens
    pub(super) shutdown: CancellationToken,
    pub(super) this: Weak<Group>,
}

impl Group {
    /// Create a group for `key`
    pub fn new(key: StreamKey, config: Arc<GroupConfig>, deps: GroupDeps) -> Arc<Self> {
        let unique_key = gen_unique_key("GROUP");

        let mut push_targets = HashMap::new();
        if config.relay_push.enabled {
            for addr in &config.relay_push.addr_list {
                push_targets.insert(key.relay_url(addr), RelayTarget::new());
            }
        }

        tracing::info!(
            group = %unique_key,
            stream = %key,
            push_targets = push_targets.len(),
            "Group created"
        );

        let state = GroupState {
            inbound: Inbound::None,
            rtmp_subs: HashMap::new(),
            httpflv_subs: HashMap::new(),
            push_targets,
            pulling: false,
            disposed: false,
            muxer: None,
            rtmp_cache: GopCache::new("rtmp", config.rtmp.gop_num),
            httpflv_cache: GopCache::new("httpflv", config.httpflv.gop_num),
        };

        Arc::new_cyclic(|this| Self {
            key,
            unique_key,
            chunk_encoder: ChunkEncoder {
                chunk_size: config.chunk_size,
            },
            config,
            connector: deps.connector,
            muxer_factory: deps.muxer_factory,
            state: Mutex::new(state),
            shutdown: CancellationToken::new(),
            this: this.clone(),
        })
    }

    /// Stream identity
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Process-unique key used in logs
    pub fn unique_key(&self) -> &str {
        &self.unique_key
    }

    pub(super) fn state(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until the group is disposed
    pub async fn run_loop(&self) {
        self.shutdown.cancelled().await;
    }

    /// Attach a local publisher
    ///
    /// Fails without touching state if any inbound source is attached.
    pub fn attach_publisher(&self, session: Arc<dyn Session>) -> Result<()> {
        let mut state = self.state();
        if state.disposed {
            return Err(GroupError::Disposed(self.key.clone()));
        }

        match &state.inbound {
            Inbound::None => {}
            Inbound::Publisher(existing) => {
                tracing::error!(
                    group = %self.unique_key,
                    old = existing.unique_key(),
                    new = session.unique_key(),
                    "Publisher already exists in group"
                );
                return Err(GroupError::PublisherExists {
                    key: self.key.clone(),
                    existing: existing.unique_key().to_string(),
                });
            }
            Inbound::Puller(_) => {
                tracing::warn!(
                    group = %self.unique_key,
                    new = session.unique_key(),
                    holder = %state.inbound.describe(),
                    "Publisher rejected, stream is relay pulled"
                );
                return Err(GroupError::InboundBusy {
                    key: self.key.clone(),
                    holder: state.inbound.describe(),
                });
            }
        }

        tracing::debug!(
            group = %self.unique_key,
            session = session.unique_key(),
            "Publisher attached"
        );
        state.inbound = Inbound::Publisher(session);
        self.start_muxer(&mut state);
        self.push_if_needed(&mut state);

        Ok(())
    }

    /// Detach the publisher
    ///
    /// Ignored unless `session` is the attached publisher. Stops the muxer,
    /// tears down every relay push and clears both caches.
    pub fn detach_publisher(&self, session: &dyn Session) {
        let mut state = self.state();

        match &state.inbound {
            Inbound::Publisher(p) if p.unique_key() == session.unique_key() => {}
            _ => {
                tracing::debug!(
                    group = %self.unique_key,
                    session = session.unique_key(),
                    "Detach of non-attached publisher ignored"
                );
                return;
            }
        }

        tracing::debug!(
            group = %self.unique_key,
            session = session.unique_key(),
            "Publisher detached"
        );
        state.inbound = Inbound::None;
        self.stop_muxer(&mut state);
        for target in state.push_targets.values_mut() {
            target.detach_session();
        }
        state.clear_caches();
    }

    /// Attach a relay pull session as the inbound source
    pub fn attach_puller(&self, session: Arc<dyn Session>) -> Result<()> {
        let mut state = self.state();
        if state.disposed {
            return Err(GroupError::Disposed(self.key.clone()));
        }

        if !matches!(state.inbound, Inbound::None) {
            tracing::warn!(
                group = %self.unique_key,
                new = session.unique_key(),
                holder = %state.inbound.describe(),
                "Puller rejected, inbound already attached"
            );
            return Err(GroupError::InboundBusy {
                key: self.key.clone(),
                holder: state.inbound.describe(),
            });
        }

        tracing::debug!(
            group = %self.unique_key,
            session = session.unique_key(),
            "Puller attached"
        );
        state.inbound = Inbound::Puller(session);
        self.start_muxer(&mut state);

        Ok(())
    }

    /// Detach a relay pull session and end the pull attempt
    ///
    /// The pulling flag is always cleared; the inbound slot, muxer and caches
    /// are only reset if `session` is the attached puller.
    pub fn detach_puller(&self, session: &dyn Session) {
        let mut state = self.state();
        state.pulling = false;

        match &state.inbound {
            Inbound::Puller(p) if p.unique_key() == session.unique_key() => {}
            _ => return,
        }

        tracing::debug!(
            group = %self.unique_key,
            session = session.unique_key(),
            "Puller detached"
        );
        state.inbound = Inbound::None;
        self.stop_muxer(&mut state);
        state.clear_caches();
    }

    /// Add a player
    ///
    /// HTTP-FLV players get the FLV file header queued before anything else.
    /// Adding an already present session is a no-op.
    pub fn add_subscriber(&self, kind: SubscriberKind, session: Arc<dyn Subscriber>) -> Result<()> {
        let mut state = self.state();
        if state.disposed {
            return Err(GroupError::Disposed(self.key.clone()));
        }

        let key = session.unique_key().to_string();
        if state.subs_mut(kind).contains_key(&key) {
            return Ok(());
        }

        if kind == SubscriberKind::HttpFlv {
            let _ = session.enqueue(flv::file_header());
        }

        tracing::debug!(group = %self.unique_key, session = %key, kind = %kind, "Subscriber added");
        state.subs_mut(kind).insert(key, session);
        self.pull_if_needed(&mut state);

        Ok(())
    }

    /// Remove a player; unknown sessions are ignored
    pub fn remove_subscriber(&self, kind: SubscriberKind, session: &dyn Session) {
        let mut state = self.state();
        if state.subs_mut(kind).remove(session.unique_key()).is_some() {
            tracing::debug!(
                group = %self.unique_key,
                session = session.unique_key(),
                kind = %kind,
                "Subscriber removed"
            );
        }
    }

    /// Broadcast one inbound message
    ///
    /// Called by the inbound source's task for every message, in order.
    pub fn on_message(&self, msg: AvMessage) {
        let mut state = self.state();
        if state.disposed {
            return;
        }

        self.dispatch(&mut state, &msg);
    }

    /// Broadcast one message from a relay pull session
    ///
    /// Dropped unless `session` is the attached puller, so a pull that lost
    /// the race or already detached never feeds another source's epoch.
    pub(super) fn on_pulled_message(&self, session: &str, msg: AvMessage) {
        let mut state = self.state();
        match &state.inbound {
            Inbound::Puller(p) if p.unique_key() == session => {}
            _ => {
                tracing::trace!(group = %self.unique_key, session, "Message from detached puller dropped");
                return;
            }
        }

        self.dispatch(&mut state, &msg);
    }

    /// Re-evaluate relay pull and relay push
    ///
    /// Cheap and idempotent; meant to be driven by a periodic caller.
    pub fn tick(&self) {
        let mut state = self.state();
        if state.disposed {
            return;
        }

        self.pull_if_needed(&mut state);
        self.push_if_needed(&mut state);
    }

    /// No publisher, no puller and no players
    pub fn is_empty(&self) -> bool {
        let state = self.state();
        matches!(state.inbound, Inbound::None) && !state.has_subscribers()
    }

    /// Whether `dispose` has run
    pub fn is_disposed(&self) -> bool {
        self.state().disposed
    }

    /// Tear down every session, relay attempt and the muxer
    ///
    /// Later calls are no-ops. Concurrent callers of other operations see an
    /// empty, disposed group afterwards.
    pub fn dispose(&self) {
        let mut state = self.state();
        if state.disposed {
            return;
        }
        state.disposed = true;

        tracing::info!(group = %self.unique_key, stream = %self.key, "Group disposed");
        self.shutdown.cancel();

        match std::mem::replace(&mut state.inbound, Inbound::None) {
            Inbound::Publisher(s) | Inbound::Puller(s) => s.dispose(),
            Inbound::None => {}
        }

        for (_, session) in state.rtmp_subs.drain() {
            session.dispose();
        }
        for (_, session) in state.httpflv_subs.drain() {
            session.dispose();
        }

        self.stop_muxer(&mut state);

        for (_, mut target) in state.push_targets.drain() {
            target.detach_session();
        }
        state.pulling = false;
        state.clear_caches();
    }

    /// Snapshot of the group
    pub fn stats(&self) -> GroupStats {
        let state = self.state();

        let (publisher, puller) = match &state.inbound {
            Inbound::None => (None, None),
            Inbound::Publisher(s) => (Some(s.unique_key().to_string()), None),
            Inbound::Puller(s) => (None, Some(s.unique_key().to_string())),
        };

        GroupStats {
            unique_key: self.unique_key.clone(),
            key: self.key.clone(),
            publisher,
            puller,
            pulling: state.pulling,
            rtmp_subscribers: state.rtmp_subs.len(),
            httpflv_subscribers: state.httpflv_subs.len(),
            push_targets: state.push_targets.len(),
            active_pushes: state
                .push_targets
                .values()
                .filter(|t| t.is_attached())
                .count(),
            rtmp_gops: state.rtmp_cache.gop_count(),
            httpflv_gops: state.httpflv_cache.gop_count(),
        }
    }

    fn dispatch(&self, state: &mut GroupState, msg: &AvMessage) {
        self.broadcast(state, msg);

        if let Some(muxer) = state.muxer.as_mut() {
            muxer.feed(msg);
        }
    }

    fn broadcast(&self, state: &mut GroupState, msg: &AvMessage) {
        let chunked = LazyConverter::new(msg, &self.chunk_encoder);
        let tagged = LazyConverter::new(msg, &FlvTagEncoder);

        let GroupState {
            rtmp_subs,
            httpflv_subs,
            push_targets,
            rtmp_cache,
            httpflv_cache,
            ..
        } = state;

        for session in rtmp_subs.values() {
            deliver(session.as_ref(), rtmp_cache, &chunked);
        }

        for session in push_targets.values().filter_map(|t| t.session.as_ref()) {
            deliver(session.as_ref(), rtmp_cache, &chunked);
        }

        for session in httpflv_subs.values() {
            deliver(session.as_ref(), httpflv_cache, &tagged);
        }

        if self.config.rtmp.enabled {
            rtmp_cache.feed(msg, || chunked.get());
        }
        if self.config.httpflv.enabled {
            httpflv_cache.feed(msg, || tagged.get());
        }
    }

    fn start_muxer(&self, state: &mut GroupState) {
        if !self.config.hls.enabled {
            return;
        }
        let Some(factory) = &self.muxer_factory else {
            return;
        };

        self.stop_muxer(state);
        let mut muxer = factory.create(&self.key);
        muxer.start();
        state.muxer = Some(muxer);
    }

    fn stop_muxer(&self, state: &mut GroupState) {
        if let Some(mut muxer) = state.muxer.take() {
            muxer.dispose();
        }
    }
}

/// Replay the cache to a fresh consumer, then queue the live message
fn deliver<E: Encoder + ?Sized>(session: &dyn Subscriber, cache: &GopCache, live: &LazyConverter<'_, E>) {
    if session.is_fresh() {
        for block in cache.replay() {
            let _ = session.enqueue(block.clone());
        }
        session.mark_not_fresh();
    }

    if !session.enqueue(live.get()) {
        tracing::trace!(session = session.unique_key(), "Enqueue rejected");
    }
}

impl MessageSink for Group {
    fn on_av_message(&self, msg: AvMessage) {
        self.on_message(msg);
    }
}
