use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use watchkeep::config::loader::Config;
use watchkeep::config::types::AlertsConfig;
use watchkeep::notify::Notifier;
use watchkeep::store::{MemoryStore, Store};
use watchkeep::supervisor::Supervisor;
use watchkeep::types::{Conditions, Target, TargetKind};

fn target(id: &str, url: &str, index: usize) -> Target {
    Target {
        id: id.to_string(),
        kind: TargetKind::Http,
        url: url.to_string(),
        method: None,
        headers: HashMap::new(),
        name: None,
        description: None,
        group: None,
        tags: vec![],
        // Long enough that the spawned watcher never fires a real probe
        // during the test's lifetime.
        interval: Duration::from_secs(3600),
        timeout: Duration::from_secs(1),
        initial_delay: Duration::from_secs(3600),
        success_threshold: 2,
        failure_threshold: 3,
        conditions: Conditions {
            codes: vec![200],
            body: None,
        },
        alerts: vec![],
        hidden: false,
        index,
    }
}

fn config(hosts: Vec<Target>) -> Config {
    Config {
        max_conn: 4,
        hosts,
        alerts: AlertsConfig::default(),
    }
}

#[tokio::test]
async fn reconcile_spawns_updates_and_removes_watchers() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let notifier = Arc::new(Notifier::from_config(&AlertsConfig::default()).unwrap());
    let supervisor = Arc::new(Supervisor::new(store, notifier));

    supervisor
        .reconcile(&config(vec![
            target("a", "https://a.example", 0),
            target("b", "https://b.example", 1),
        ]))
        .await;
    let mut ids: Vec<String> = supervisor.targets().await.into_iter().map(|t| t.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

    supervisor
        .reconcile(&config(vec![
            target("a", "https://a.example", 0),
            target("c", "https://c.example", 1),
        ]))
        .await;
    let mut ids: Vec<String> = supervisor.targets().await.into_iter().map(|t| t.id).collect();
    ids.sort();
    assert_eq!(ids, vec!["a".to_string(), "c".to_string()]);

    supervisor.shutdown().await;
    assert!(supervisor.targets().await.is_empty());
}

#[tokio::test]
async fn reconcile_is_idempotent_for_an_unchanged_config() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let notifier = Arc::new(Notifier::from_config(&AlertsConfig::default()).unwrap());
    let supervisor = Arc::new(Supervisor::new(store, notifier));

    let cfg = config(vec![target("a", "https://a.example", 0)]);
    supervisor.reconcile(&cfg).await;
    supervisor.reconcile(&cfg).await;

    let ids: Vec<String> = supervisor.targets().await.into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["a".to_string()]);

    supervisor.shutdown().await;
}
