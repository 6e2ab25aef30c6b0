//! The persistent record keeper: per-target response history and incidents.
//!
//! One async trait, two backends: an in-memory map for tests and
//! ephemeral runs, and a `sled`-backed tree-per-target store for
//! anything that needs to survive a restart.

pub mod aggregate;
pub mod memory;
pub mod sled_store;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Incident, Response};

#[async_trait]
pub trait Store: Send + Sync {
    async fn add_response(&self, target_id: &str, response: Response) -> Result<(), StoreError>;
    async fn find_responses(&self, target_id: &str) -> Result<Vec<Response>, StoreError>;
    async fn delete_responses(
        &self,
        target_id: &str,
        timestamps: &[i64],
    ) -> Result<(), StoreError>;
    async fn hosts(&self) -> Result<Vec<String>, StoreError>;

    async fn add_incident(&self, target_id: &str, start_ts: i64) -> Result<Incident, StoreError>;
    async fn end_incident(
        &self,
        target_id: &str,
        incident_id: u64,
        end_ts: i64,
    ) -> Result<(), StoreError>;
    async fn find_incidents(
        &self,
        target_id: &str,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Incident>, StoreError>;

    /// The single open incident for a target, if any (I3: at most one).
    async fn open_incident(&self, target_id: &str) -> Result<Option<Incident>, StoreError> {
        let all = self.find_incidents(target_id, 0, 0).await?;
        Ok(all.into_iter().find(|i| i.is_open()))
    }

    /// Releases backend resources. A no-op for the in-memory backend.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// `skip`/`limit` <= 0 both mean "no bound".
pub(crate) fn apply_skip_limit<T>(mut items: Vec<T>, skip: i64, limit: i64) -> Vec<T> {
    if skip > 0 {
        let skip = skip as usize;
        if skip >= items.len() {
            return Vec::new();
        }
        items.drain(0..skip);
    }
    if limit > 0 {
        items.truncate(limit as usize);
    }
    items
}
