//! Persistent store backend over `sled`: one tree per target for
//! responses, plus a reserved-prefix tree per target for incidents.
//! Response keys are big-endian UNIX-second timestamps so tree iteration
//! is time-ordered with no explicit sort step.
//!
//! Each target gets its own `sled::Tree`, so opening, compacting, or
//! dropping one target's history never touches another's.

use async_trait::async_trait;
use sled::Db;

use super::apply_skip_limit;
use crate::error::StoreError;
use crate::store::Store;
use crate::types::{Incident, Response};

const INCIDENT_TREE_PREFIX: &str = "__incidents__";

pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(SledStore { db })
    }

    fn responses_tree(&self, target_id: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(target_id)?)
    }

    fn incidents_tree(&self, target_id: &str) -> Result<sled::Tree, StoreError> {
        Ok(self.db.open_tree(format!("{INCIDENT_TREE_PREFIX}{target_id}"))?)
    }
}

fn key_for(ts: i64) -> [u8; 8] {
    (ts as u64).to_be_bytes()
}

#[async_trait]
impl Store for SledStore {
    async fn add_response(&self, target_id: &str, response: Response) -> Result<(), StoreError> {
        let tree = self.responses_tree(target_id)?;
        let key = key_for(response.timestamp);
        let value = serde_json::to_vec(&response)?;
        tree.insert(key, value)?;
        Ok(())
    }

    async fn find_responses(&self, target_id: &str) -> Result<Vec<Response>, StoreError> {
        let tree = self.responses_tree(target_id)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    async fn delete_responses(
        &self,
        target_id: &str,
        timestamps: &[i64],
    ) -> Result<(), StoreError> {
        let tree = self.responses_tree(target_id)?;
        for ts in timestamps {
            tree.remove(key_for(*ts))?;
        }
        Ok(())
    }

    async fn hosts(&self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        for name in self.db.tree_names() {
            let name = String::from_utf8_lossy(&name).to_string();
            if name == "__sled__default" || name.starts_with(INCIDENT_TREE_PREFIX) {
                continue;
            }
            let tree = self.db.open_tree(&name)?;
            if !tree.is_empty() {
                out.push(name);
            }
        }
        Ok(out)
    }

    async fn add_incident(&self, target_id: &str, start_ts: i64) -> Result<Incident, StoreError> {
        let tree = self.incidents_tree(target_id)?;
        let next_id = tree
            .iter()
            .keys()
            .filter_map(|k| k.ok())
            .filter_map(|k| k.as_ref().try_into().ok().map(u64::from_be_bytes))
            .max()
            .unwrap_or(0)
            + 1;
        let incident = Incident {
            id: next_id,
            start_ts,
            end_ts: None,
        };
        tree.insert(next_id.to_be_bytes(), serde_json::to_vec(&incident)?)?;
        Ok(incident)
    }

    async fn end_incident(
        &self,
        target_id: &str,
        incident_id: u64,
        end_ts: i64,
    ) -> Result<(), StoreError> {
        let tree = self.incidents_tree(target_id)?;
        if let Some(bytes) = tree.get(incident_id.to_be_bytes())? {
            let mut incident: Incident = serde_json::from_slice(&bytes)?;
            if incident.end_ts.is_none() {
                incident.end_ts = Some(end_ts);
                tree.insert(incident_id.to_be_bytes(), serde_json::to_vec(&incident)?)?;
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
        let tree = self.incidents_tree(target_id)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice::<Incident>(&value)?);
        }
        out.reverse();
        Ok(apply_skip_limit(out, skip, limit))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }
}
