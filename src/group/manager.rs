//! Stream table
//!
//! Owns one `Group` per stream key, creates groups on first use and drives
//! their relay re-evaluation from a single periodic task. Groups that end up
//! empty are disposed and dropped on the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::hub::{Group, GroupDeps};
use super::key::StreamKey;
use crate::config::GroupConfig;

/// Lower bound for the tick period; `tokio::time::interval` rejects zero
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Central table of all live groups
pub struct GroupManager {
    groups: RwLock<HashMap<StreamKey, Arc<Group>>>,
    config: Arc<GroupConfig>,
    deps: GroupDeps,
}

impl GroupManager {
    /// Create a manager whose groups share `config` and `deps`
    pub fn new(config: GroupConfig, deps: GroupDeps) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            config: Arc::new(config),
            deps,
        }
    }

    /// Configuration shared by every group
    pub fn config(&self) -> &GroupConfig {
        &self.config
    }

    /// Get the group for a stream, creating it if needed
    ///
    /// A group disposed by an earlier tick is replaced. A returned group that
    /// nothing attaches to can still be reaped by the next tick; callers that
    /// then get `GroupError::Disposed` call this again.
    pub async fn get_or_create(&self, app: &str, stream: &str) -> Arc<Group> {
        let key = StreamKey::new(app, stream);

        if let Some(group) = self.groups.read().await.get(&key) {
            if !group.is_disposed() {
                return Arc::clone(group);
            }
        }

        let mut groups = self.groups.write().await;
        // Another caller may have won the race between the two locks
        if let Some(group) = groups.get(&key) {
            if !group.is_disposed() {
                return Arc::clone(group);
            }
        }

        let group = Group::new(key.clone(), Arc::clone(&self.config), self.deps.clone());
        groups.insert(key, Arc::clone(&group));
        group
    }

    /// Get an existing group
    pub async fn get(&self, app: &str, stream: &str) -> Option<Arc<Group>> {
        let key = StreamKey::new(app, stream);
        self.groups.read().await.get(&key).cloned()
    }

    /// Number of live groups
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }

    /// Tick every group once, then dispose and remove the empty ones
    pub async fn tick_all(&self) {
        let mut groups = self.groups.write().await;

        groups.retain(|key, group| {
            group.tick();

            if group.is_empty() {
                tracing::info!(stream = %key, group = %group.unique_key(), "Removing empty group");
                group.dispose();
                false
            } else {
                true
            }
        });
    }

    /// Spawn the periodic tick task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_tick_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.spawn_tick_task_every(self.config.relay_check_interval())
    }

    /// Spawn the periodic tick task with an explicit interval
    ///
    /// Intervals below one millisecond are raised to one millisecond.
    pub fn spawn_tick_task_every(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = interval.max(MIN_TICK_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                manager.tick_all().await;
            }
        })
    }

    /// Dispose and drop every group
    pub async fn dispose_all(&self) {
        let mut groups = self.groups.write().await;
        for (_, group) in groups.drain() {
            group.dispose();
        }
    }
}
