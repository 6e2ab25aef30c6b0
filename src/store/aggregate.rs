//! Nightly aggregation: collapses a completed day's raw responses per
//! target into one synthetic record.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};

use crate::error::StoreError;
use crate::store::Store;
use crate::types::{Response, StatusType};

/// Runs one aggregation pass over every target's non-aggregated responses
/// with a timestamp strictly before today's local midnight.
pub async fn aggregate(store: &Arc<dyn Store>) -> Result<(), StoreError> {
    let today = Utc::now().date_naive();
    for target_id in store.hosts().await? {
        aggregate_target(store, &target_id, today).await?;
    }
    Ok(())
}

async fn aggregate_target(
    store: &Arc<dyn Store>,
    target_id: &str,
    today: NaiveDate,
) -> Result<(), StoreError> {
    let responses = store.find_responses(target_id).await?;
    let mut by_day: BTreeMap<NaiveDate, Vec<Response>> = BTreeMap::new();
    for r in responses {
        if r.is_aggregated {
            continue;
        }
        let day = Utc
            .timestamp_opt(r.timestamp, 0)
            .single()
            .map(|dt| dt.date_naive())
            .unwrap_or(today);
        if day < today {
            by_day.entry(day).or_default().push(r);
        }
    }

    for (day, bucket) in by_day {
        let aggregate = collapse(day, &bucket);
        let timestamps: Vec<i64> = bucket.iter().map(|r| r.timestamp).collect();
        store.delete_responses(target_id, &timestamps).await?;
        store.add_response(target_id, aggregate).await?;
    }
    Ok(())
}

/// Collapses one day's raw responses into a single synthetic record
/// stamped at that day's midnight.
/// Exposed so the Stats Engine can reuse it for "today" on-the-fly rollups.
pub fn collapse(day: NaiveDate, bucket: &[Response]) -> Response {
    let count = bucket.len() as u32;
    let non_down = bucket
        .iter()
        .filter(|r| r.status_type != StatusType::Down)
        .count();
    let uptime = if count == 0 {
        0.0
    } else {
        non_down as f64 / count as f64
    };
    let mean_duration = if bucket.is_empty() {
        0
    } else {
        (bucket.iter().map(|r| r.duration_ms).sum::<u64>() / bucket.len() as u64) as u64
    };
    let status_type = if uptime > 0.95 {
        StatusType::Up
    } else if uptime > 0.5 {
        StatusType::Degraded
    } else {
        StatusType::Down
    };
    let midnight: DateTime<Utc> = Utc
        .from_utc_datetime(&day.and_hms_opt(0, 0, 0).expect("valid midnight"));

    Response {
        timestamp: midnight.timestamp(),
        duration_ms: mean_duration,
        code: 0,
        body: None,
        ok: true,
        bytes: 0,
        status: uptime > 0.5,
        status_type,
        timing: None,
        ssl_expires_at: None,
        is_aggregated: true,
        uptime_fraction: uptime,
        count,
    }
}

/// Computes how long to sleep until the next "midnight + 10m" aggregation
/// tick.
pub fn duration_until_next_run(now: DateTime<Utc>) -> std::time::Duration {
    let tomorrow_midnight = (now.date_naive() + ChronoDuration::days(1))
        .and_hms_opt(0, 10, 0)
        .expect("valid time");
    let target = Utc.from_utc_datetime(&tomorrow_midnight);
    let delta = target - now;
    delta.to_std().unwrap_or(std::time::Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn response(ts: i64, status_type: StatusType) -> Response {
        Response {
            timestamp: ts,
            duration_ms: 100,
            code: 200,
            body: None,
            ok: true,
            bytes: 0,
            status: status_type != StatusType::Down,
            status_type,
            timing: None,
            ssl_expires_at: None,
            is_aggregated: false,
            uptime_fraction: 1.0,
            count: 1,
        }
    }

    #[tokio::test]
    async fn collapses_yesterday_into_one_aggregate() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let yesterday = Utc::now().date_naive() - ChronoDuration::days(1);
        let base = Utc
            .from_utc_datetime(&yesterday.and_hms_opt(0, 0, 0).unwrap())
            .timestamp();
        for i in 0..120 {
            let status = if i < 80 { StatusType::Up } else { StatusType::Down };
            store
                .add_response("t1", response(base + i as i64 * 60, status))
                .await
                .unwrap();
        }
        aggregate(&store).await.unwrap();
        let responses = store.find_responses("t1").await.unwrap();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].is_aggregated);
        assert_eq!(responses[0].count, 120);
        assert_eq!(responses[0].status_type, StatusType::Degraded);
    }

    #[tokio::test]
    async fn does_not_touch_todays_responses() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store
            .add_response("t1", response(Utc::now().timestamp(), StatusType::Up))
            .await
            .unwrap();
        aggregate(&store).await.unwrap();
        let responses = store.find_responses("t1").await.unwrap();
        assert_eq!(responses.len(), 1);
        assert!(!responses[0].is_aggregated);
    }
}
