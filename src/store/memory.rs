//! In-memory store backend: a map of maps, guarded by one `RwLock` per
//! logical operation. Used for tests and ephemeral runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::apply_skip_limit;
use crate::error::StoreError;
use crate::types::{Incident, Response};
use crate::store::Store;

#[derive(Default)]
struct TargetRecords {
    responses: HashMap<i64, Response>,
    incidents: Vec<Incident>,
    next_incident_id: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    targets: RwLock<HashMap<String, TargetRecords>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add_response(&self, target_id: &str, response: Response) -> Result<(), StoreError> {
        let mut targets = self.targets.write().await;
        let entry = targets.entry(target_id.to_string()).or_default();
        entry.responses.insert(response.timestamp, response);
        Ok(())
    }

    async fn find_responses(&self, target_id: &str) -> Result<Vec<Response>, StoreError> {
        let targets = self.targets.read().await;
        let mut out: Vec<Response> = targets
            .get(target_id)
            .map(|t| t.responses.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by_key(|r| r.timestamp);
        Ok(out)
    }

    async fn delete_responses(
        &self,
        target_id: &str,
        timestamps: &[i64],
    ) -> Result<(), StoreError> {
        let mut targets = self.targets.write().await;
        if let Some(entry) = targets.get_mut(target_id) {
            for ts in timestamps {
                entry.responses.remove(ts);
            }
        }
        Ok(())
    }

    async fn hosts(&self) -> Result<Vec<String>, StoreError> {
        let targets = self.targets.read().await;
        Ok(targets
            .iter()
            .filter(|(_, t)| !t.responses.is_empty())
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn add_incident(&self, target_id: &str, start_ts: i64) -> Result<Incident, StoreError> {
        let mut targets = self.targets.write().await;
        let entry = targets.entry(target_id.to_string()).or_default();
        entry.next_incident_id += 1;
        let incident = Incident {
            id: entry.next_incident_id,
            start_ts,
            end_ts: None,
        };
        entry.incidents.push(incident.clone());
        Ok(incident)
    }

    async fn end_incident(
        &self,
        target_id: &str,
        incident_id: u64,
        end_ts: i64,
    ) -> Result<(), StoreError> {
        let mut targets = self.targets.write().await;
        if let Some(entry) = targets.get_mut(target_id) {
            if let Some(incident) = entry.incidents.iter_mut().find(|i| i.id == incident_id) {
                if incident.end_ts.is_none() {
                    incident.end_ts = Some(end_ts);
                }
            }
        }
        Ok(())
    }

    async fn find_incidents(
        &self,
        target_id: &str,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Incident>, StoreError> {
        let targets = self.targets.read().await;
        let mut incidents = targets
            .get(target_id)
            .map(|t| t.incidents.clone())
            .unwrap_or_default();
        incidents.reverse();
        Ok(apply_skip_limit(incidents, skip, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_at(ts: i64) -> Response {
        Response {
            timestamp: ts,
            duration_ms: 10,
            code: 200,
            body: None,
            ok: true,
            bytes: 0,
            status: true,
            status_type: crate::types::StatusType::Up,
            timing: None,
            ssl_expires_at: None,
            is_aggregated: false,
            uptime_fraction: 1.0,
            count: 1,
        }
    }

    #[tokio::test]
    async fn round_trips_responses_in_order() {
        let store = MemoryStore::new();
        store.add_response("t1", response_at(200)).await.unwrap();
        store.add_response("t1", response_at(100)).await.unwrap();
        let found = store.find_responses("t1").await.unwrap();
        assert_eq!(found.iter().map(|r| r.timestamp).collect::<Vec<_>>(), vec![100, 200]);
    }

    #[tokio::test]
    async fn at_most_one_open_incident() {
        let store = MemoryStore::new();
        let i1 = store.add_incident("t1", 1).await.unwrap();
        store.end_incident("t1", i1.id, 2).await.unwrap();
        let i2 = store.add_incident("t1", 3).await.unwrap();
        assert_ne!(i1.id, i2.id);
        let open = store.open_incident("t1").await.unwrap();
        assert_eq!(open.unwrap().id, i2.id);
    }

    #[tokio::test]
    async fn incidents_returned_newest_first() {
        let store = MemoryStore::new();
        let i1 = store.add_incident("t1", 1).await.unwrap();
        store.end_incident("t1", i1.id, 2).await.unwrap();
        let i2 = store.add_incident("t1", 3).await.unwrap();
        store.end_incident("t1", i2.id, 4).await.unwrap();
        let found = store.find_incidents("t1", 0, 0).await.unwrap();
        assert_eq!(found[0].id, i2.id);
        assert_eq!(found[1].id, i1.id);
    }

    #[tokio::test]
    async fn skip_and_limit_zero_means_unbounded() {
        let store = MemoryStore::new();
        for ts in 0..5 {
            store.add_incident("t1", ts).await.unwrap();
        }
        let found = store.find_incidents("t1", 0, 0).await.unwrap();
        assert_eq!(found.len(), 5);
    }
}
