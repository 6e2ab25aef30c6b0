//! MongoDB probe: connect, ping, and inspect replica-set status.
//!
//! Synthetic status codes stand in for an HTTP-shaped result: 200
//! healthy, 500 replica set not primary-capable, 501 ping failed, 502
//! `replicaSet` declared but server reports none, 503 any other error.

use std::time::{Duration, Instant};

use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;

use crate::error::DialerError;
use crate::types::{Response, StatusType, Target};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn probe(target: &Target) -> Result<Response, DialerError> {
    let start = Instant::now();
    let code = run_probe(target).await?;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = target.predicate(code, None);

    Ok(Response {
        timestamp: chrono::Utc::now().timestamp(),
        duration_ms,
        code,
        body: None,
        ok: true,
        bytes: 0,
        status,
        status_type: StatusType::Unknown,
        timing: None,
        ssl_expires_at: None,
        is_aggregated: false,
        uptime_fraction: if status { 1.0 } else { 0.0 },
        count: 1,
    })
}

async fn run_probe(target: &Target) -> Result<u16, DialerError> {
    let mut options = ClientOptions::parse(&target.url)
        .await
        .map_err(|e| DialerError::Dial(e.to_string()))?;
    options.connect_timeout = Some(CONNECT_TIMEOUT);
    options.server_selection_timeout = Some(target.timeout);
    let wants_replica_set = options.repl_set_name.is_some();

    let client = Client::with_options(options).map_err(|e| DialerError::Dial(e.to_string()))?;
    let admin = client.database("admin");

    if admin.run_command(doc! { "ping": 1 }).await.is_err() {
        return Ok(501);
    }

    match admin.run_command(doc! { "replSetGetStatus": 1 }).await {
        Ok(doc) => {
            let my_state = doc.get_i32("myState").unwrap_or(0);
            if my_state == 1 {
                Ok(200)
            } else {
                Ok(500)
            }
        }
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("NoReplicationEnabled") {
                if wants_replica_set {
                    Ok(502)
                } else {
                    // Replication genuinely isn't enabled and the URL never
                    // asked for a replica set, so there's nothing to be in
                    // the wrong state about.
                    Ok(200)
                }
            } else {
                Ok(503)
            }
        }
    }
}
