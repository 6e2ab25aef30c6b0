//! The supervisor: reconciles the desired target set against running
//! watchers, and owns the tag-colour registry and the nightly aggregator.
//!
//! Reconcile is spawn-if-missing, cancel+respawn-if-present, then remove
//! watchers whose id vanished from the new config — the whole map is
//! guarded by a single coarse `tokio::sync::Mutex` rather than per-entry
//! locks, since reconcile itself only runs on config reload.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::loader::Config;
use crate::config::TagColours;
use crate::dialer::Dialer;
use crate::notify::Notifier;
use crate::store::{aggregate, Store};
use crate::watcher::Watcher;

struct Running {
    watcher: Arc<Watcher>,
    handle: tokio::task::JoinHandle<()>,
}

pub struct Supervisor {
    store: Arc<dyn Store>,
    notifier: Arc<Notifier>,
    dialer: Mutex<Dialer>,
    watchers: Mutex<HashMap<String, Running>>,
    pub tag_colours: TagColours,
    root_token: CancellationToken,
}

impl Supervisor {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<Notifier>) -> Self {
        Supervisor {
            store,
            notifier,
            dialer: Mutex::new(Dialer::new(crate::config::loader::DEFAULT_MAX_CONN)),
            watchers: Mutex::new(HashMap::new()),
            tag_colours: TagColours::new(),
            root_token: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    /// Brings the live watcher set into agreement with `config.hosts`.
    pub async fn reconcile(&self, config: &Config) {
        {
            let mut dialer = self.dialer.lock().await;
            *dialer = Dialer::new(config.max_conn);
        }
        for target in &target_ids_sorted(&config.hosts) {
            self.tag_colours_touch(target);
        }

        let mut watchers = self.watchers.lock().await;
        let desired: HashMap<&str, &crate::types::Target> =
            config.hosts.iter().map(|t| (t.id.as_str(), t)).collect();

        // Spawn-if-missing, cancel+respawn-if-present.
        let dialer = self.dialer.lock().await.clone();
        for target in &config.hosts {
            if let Some(existing) = watchers.remove(&target.id) {
                // Cancel and let the task observe it at its own select point so
                // any in-flight probe still completes and is recorded; dropping
                // the handle here detaches it rather than aborting it mid-probe.
                existing.watcher.cancel();
            }
            let (watcher, handle) = Watcher::spawn(
                target.clone(),
                dialer.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.notifier),
                &self.root_token,
            );
            watchers.insert(target.id.clone(), Running { watcher, handle });
        }

        // Remove watchers whose id is absent from the new config.
        let stale: Vec<String> = watchers
            .keys()
            .filter(|id| !desired.contains_key(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            if let Some(running) = watchers.remove(&id) {
                running.watcher.cancel();
            }
        }
    }

    fn tag_colours_touch(&self, target: &crate::types::Target) {
        for tag in &target.tags {
            self.tag_colours.colour_for(tag);
        }
    }

    pub async fn status_of(&self, target_id: &str) -> Option<crate::types::StatusType> {
        let watchers = self.watchers.lock().await;
        if let Some(running) = watchers.get(target_id) {
            Some(running.watcher.status().await)
        } else {
            None
        }
    }

    pub async fn targets(&self) -> Vec<crate::types::Target> {
        let watchers = self.watchers.lock().await;
        watchers.values().map(|r| r.watcher.target.clone()).collect()
    }

    /// Every live target paired with its current status, for the Stats
    /// Engine's system-level query.
    pub async fn snapshot(&self) -> Vec<(crate::types::Target, crate::types::StatusType)> {
        let watchers = self.watchers.lock().await;
        let mut out = Vec::with_capacity(watchers.len());
        for running in watchers.values() {
            let status = running.watcher.status().await;
            out.push((running.watcher.target.clone(), status));
        }
        out
    }

    /// Cancels every watcher and waits for its loop to notice, so an
    /// in-flight probe still completes and is recorded before the store
    /// closes underneath it. Cancellation latency is bounded by each
    /// watcher's own `interval + timeout`, never aborted outright.
    pub async fn shutdown(&self) {
        let handles = {
            let mut watchers = self.watchers.lock().await;
            let mut handles = Vec::with_capacity(watchers.len());
            for (_, running) in watchers.drain() {
                running.watcher.cancel();
                handles.push(running.handle);
            }
            handles
        };
        self.root_token.cancel();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Spawns the background aggregation task: one pass at startup, then
    /// re-armed for "10 minutes after each local midnight".
    pub fn spawn_aggregator(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = aggregate::aggregate(&supervisor.store).await {
                tracing::warn!(error = %e, "startup aggregation pass failed");
            }
            loop {
                let wait = aggregate::duration_until_next_run(chrono::Utc::now());
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        if let Err(e) = aggregate::aggregate(&supervisor.store).await {
                            tracing::warn!(error = %e, "nightly aggregation pass failed");
                        }
                    }
                    _ = supervisor.root_token.cancelled() => return,
                }
            }
        })
    }
}

fn target_ids_sorted(hosts: &[crate::types::Target]) -> Vec<crate::types::Target> {
    let mut hosts = hosts.to_vec();
    hosts.sort_by_key(|h| h.index);
    hosts
}
