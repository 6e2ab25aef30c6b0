//! The per-target probe loop and threshold state machine.
//!
//! Status transitions are driven by consecutive-result streak counters
//! rather than a sliding history window, since a streak is decidable
//! without reading back stored history. Each watcher runs as its own
//! cancellable tokio task, torn down via a `tokio_util::sync::CancellationToken`
//! when the supervisor reconciles it away.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::dialer::Dialer;
use crate::notify::Notifier;
use crate::store::Store;
use crate::types::{StatusType, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiveState {
    Unknown,
    Up,
    Down,
}

struct Counters {
    state: LiveState,
    success_streak: u32,
    failure_streak: u32,
    open_incident_id: Option<u64>,
}

impl Default for Counters {
    fn default() -> Self {
        Counters {
            state: LiveState::Unknown,
            success_streak: 0,
            failure_streak: 0,
            open_incident_id: None,
        }
    }
}

pub struct Watcher {
    pub target: Target,
    dialer: Dialer,
    store: Arc<dyn Store>,
    notifier: Arc<Notifier>,
    counters: Mutex<Counters>,
    token: CancellationToken,
}

impl Watcher {
    pub fn spawn(
        target: Target,
        dialer: Dialer,
        store: Arc<dyn Store>,
        notifier: Arc<Notifier>,
        parent_token: &CancellationToken,
    ) -> (Arc<Self>, tokio::task::JoinHandle<()>) {
        let token = parent_token.child_token();
        let watcher = Arc::new(Watcher {
            target,
            dialer,
            store,
            notifier,
            counters: Mutex::new(Counters::default()),
            token,
        });
        let handle = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.run().await })
        };
        (watcher, handle)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Current public status, `Unknown` until the first threshold fires (I6).
    pub async fn status(&self) -> StatusType {
        match self.counters.lock().await.state {
            LiveState::Unknown => StatusType::Unknown,
            LiveState::Up => StatusType::Up,
            LiveState::Down => StatusType::Down,
        }
    }

    async fn run(self: Arc<Self>) {
        if !self.target.initial_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.target.initial_delay) => {}
                _ = self.token.cancelled() => return,
            }
        }

        if let Ok(Some(open)) = self.store.open_incident(&self.target.id).await {
            let mut counters = self.counters.lock().await;
            counters.open_incident_id = Some(open.id);
            // Adopting an open incident means the target was last known Down;
            // seed the state machine there so a later success streak takes
            // the Down→Up branch and actually closes it, instead of falling
            // into the Unknown branch and leaking a second open incident.
            counters.state = LiveState::Down;
        }

        let mut interval = tokio::time::interval(self.target.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.probe_once().await;
                }
                _ = self.token.cancelled() => return,
            }
        }
    }

    async fn probe_once(&self) {
        let mut response = self.dialer.dial(&self.target).await;
        let verdict = response.status;
        let new_status = self.advance(verdict).await;
        response.status_type = new_status;

        if let Err(e) = self.store.add_response(&self.target.id, response).await {
            tracing::warn!(target_id = %self.target.id, error = %e, "failed to persist response");
        }
    }

    /// Advances the streak-counter state machine on a single probe
    /// verdict, returning the (possibly unchanged) public status.
    async fn advance(&self, verdict: bool) -> StatusType {
        let mut counters = self.counters.lock().await;

        if verdict {
            counters.success_streak += 1;
            counters.failure_streak = 0;
        } else {
            counters.failure_streak += 1;
            counters.success_streak = 0;
        }

        let previous = counters.state;
        let mut transitioned_to_up = false;
        let mut transitioned_to_down = false;

        match previous {
            LiveState::Unknown => {
                if verdict && counters.success_streak >= self.target.success_threshold {
                    counters.state = LiveState::Up;
                } else if !verdict && counters.failure_streak >= self.target.failure_threshold {
                    counters.state = LiveState::Down;
                    transitioned_to_down = true;
                }
            }
            LiveState::Up => {
                if !verdict && counters.failure_streak >= self.target.failure_threshold {
                    counters.state = LiveState::Down;
                    transitioned_to_down = true;
                }
            }
            LiveState::Down => {
                if verdict && counters.success_streak >= self.target.success_threshold {
                    counters.state = LiveState::Up;
                    transitioned_to_up = true;
                }
            }
        }

        let now = chrono::Utc::now().timestamp();

        if transitioned_to_down {
            match self.store.add_incident(&self.target.id, now).await {
                Ok(incident) => counters.open_incident_id = Some(incident.id),
                Err(e) => tracing::warn!(target_id = %self.target.id, error = %e, "failed to open incident"),
            }
            // No alert on the very first transition out of Unknown.
            if previous != LiveState::Unknown {
                let target = self.target.clone();
                let notifier = Arc::clone(&self.notifier);
                drop(counters);
                notifier.notify(&target, StatusType::Down).await;
                return StatusType::Down;
            }
        }

        if transitioned_to_up {
            if let Some(incident_id) = counters.open_incident_id.take() {
                if let Err(e) = self
                    .store
                    .end_incident(&self.target.id, incident_id, now)
                    .await
                {
                    tracing::warn!(target_id = %self.target.id, error = %e, "failed to close incident");
                }
            }
            let target = self.target.clone();
            let notifier = Arc::clone(&self.notifier);
            drop(counters);
            notifier.notify(&target, StatusType::Up).await;
            return StatusType::Up;
        }

        match counters.state {
            LiveState::Unknown => StatusType::Unknown,
            LiveState::Up => StatusType::Up,
            LiveState::Down => StatusType::Down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::AlertsConfig;
    use crate::store::MemoryStore;
    use crate::types::{Conditions, TargetKind};
    use std::collections::HashMap;
    use std::time::Duration;

    fn test_target() -> Target {
        Target {
            id: "t1".into(),
            kind: TargetKind::Http,
            url: "https://example.com".into(),
            method: None,
            headers: HashMap::new(),
            name: Some("example".into()),
            description: None,
            group: None,
            tags: vec![],
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(1),
            initial_delay: Duration::ZERO,
            success_threshold: 2,
            failure_threshold: 3,
            conditions: Conditions {
                codes: vec![200],
                body: None,
            },
            alerts: vec![],
            hidden: false,
            index: 0,
        }
    }

    async fn make_watcher() -> Arc<Watcher> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let notifier = Arc::new(Notifier::from_config(&AlertsConfig::default()).unwrap());
        Arc::new(Watcher {
            target: test_target(),
            dialer: Dialer::new(1),
            store,
            notifier,
            counters: Mutex::new(Counters::default()),
            token: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn up_down_up_transition_sequence() {
        let watcher = make_watcher().await;

        assert_eq!(watcher.advance(true).await, StatusType::Unknown);
        assert_eq!(watcher.advance(true).await, StatusType::Up);

        assert_eq!(watcher.advance(false).await, StatusType::Up);
        assert_eq!(watcher.advance(false).await, StatusType::Up);
        assert_eq!(watcher.advance(false).await, StatusType::Down);

        assert_eq!(watcher.advance(true).await, StatusType::Down);
        assert_eq!(watcher.advance(true).await, StatusType::Up);

        let incidents = watcher.store.find_incidents("t1", 0, 0).await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert!(incidents[0].end_ts.is_some());
    }

    #[tokio::test]
    async fn adopted_open_incident_closes_instead_of_leaking_a_second_one() {
        let watcher = make_watcher().await;
        let adopted = watcher.store.add_incident("t1", 1).await.unwrap();
        {
            let mut counters = watcher.counters.lock().await;
            counters.open_incident_id = Some(adopted.id);
            counters.state = LiveState::Down;
        }

        assert_eq!(watcher.advance(true).await, StatusType::Down);
        assert_eq!(watcher.advance(true).await, StatusType::Up);

        let incidents = watcher.store.find_incidents("t1", 0, 0).await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].id, adopted.id);
        assert!(incidents[0].end_ts.is_some());

        assert_eq!(watcher.advance(false).await, StatusType::Up);
        assert_eq!(watcher.advance(false).await, StatusType::Up);
        assert_eq!(watcher.advance(false).await, StatusType::Down);

        let incidents = watcher.store.find_incidents("t1", 0, 0).await.unwrap();
        assert_eq!(incidents.len(), 2, "should open exactly one new incident, not leak the adopted one");
    }

    #[tokio::test]
    async fn no_notification_flag_on_first_transition_out_of_unknown() {
        let watcher = make_watcher().await;
        assert_eq!(watcher.advance(false).await, StatusType::Unknown);
        assert_eq!(watcher.advance(false).await, StatusType::Unknown);
        assert_eq!(watcher.advance(false).await, StatusType::Down);
        let incidents = watcher.store.find_incidents("t1", 0, 0).await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert!(incidents[0].end_ts.is_none());
    }
}
