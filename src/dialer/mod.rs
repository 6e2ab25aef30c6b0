//! The dialer: bounded-concurrency multi-protocol probing.
//!
//! A single `tokio::sync::Semaphore` caps in-flight probes across every
//! target kind; each probe drives its own protocol client and always
//! resolves to a structured `Response`, never a bare error.

pub mod http;
pub mod icmp;
pub mod mongo;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::types::{Response, Target, TargetKind};

#[derive(Clone)]
pub struct Dialer {
    semaphore: Arc<Semaphore>,
}

impl Dialer {
    pub fn new(max_conn: u32) -> Self {
        Dialer {
            semaphore: Arc::new(Semaphore::new(max_conn.max(1) as usize)),
        }
    }

    /// Acquires a permit, executes the probe appropriate to the target's
    /// kind, and always returns a structured `Response` — transport
    /// failures are classified into a synthetic code rather than
    /// propagated as an error.
    pub async fn dial(&self, target: &Target) -> Response {
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");
        let outcome = match target.kind {
            TargetKind::Http => http::probe(target).await,
            TargetKind::Mongo => mongo::probe(target).await,
            TargetKind::Icmp => icmp::probe(target).await,
        };
        match outcome {
            Ok(response) => response,
            Err(err) => error_response(target, err),
        }
    }
}

fn error_response(target: &Target, err: crate::error::DialerError) -> Response {
    let code = err.synthetic_code();
    let status = target.predicate(code, None);
    Response {
        timestamp: chrono::Utc::now().timestamp(),
        duration_ms: 0,
        code,
        body: None,
        ok: false,
        bytes: 0,
        status,
        status_type: crate::types::StatusType::Unknown,
        timing: None,
        ssl_expires_at: None,
        is_aggregated: false,
        uptime_fraction: if status { 1.0 } else { 0.0 },
        count: 1,
    }
}

/// Shared default for probes that have no finer timeout override.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Scenario 2: with `max_conn=3` and 9 units of 10ms work, the bounded
    /// semaphore forces three waves, so the batch finishes in [30ms, 50ms).
    #[tokio::test]
    async fn semaphore_bounds_concurrency() {
        let dialer = Dialer::new(3);
        let start = Instant::now();
        let tasks: Vec<_> = (0..9)
            .map(|_| {
                let semaphore = Arc::clone(&dialer.semaphore);
                tokio::spawn(async move {
                    let _permit = semaphore.acquire().await.unwrap();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30), "elapsed={elapsed:?}");
        assert!(elapsed < Duration::from_millis(100), "elapsed={elapsed:?}");
    }
}
