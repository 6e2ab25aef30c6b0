//! Derived views: chart points, uptime/response-time windows, group rollup.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::error::StatsError;
use crate::store::{aggregate, Store};
use crate::types::{Response, StatusType, Target};

const LIVE_CHART_POINTS: usize = 90;
const DAY_CHART_POINTS: usize = 91;

#[derive(Debug, Clone, Serialize)]
pub struct Point {
    pub timestamp: String,
    pub status: StatusType,
    pub response_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chart {
    pub points: Vec<Point>,
    pub intervals: [String; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct Details {
    pub uptime_30d: String,
    pub uptime_7d: String,
    pub uptime_24h: String,
    pub response_30d_ms: String,
    pub response_7d_ms: String,
    pub response_24h_ms: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetStats {
    pub id: String,
    pub name: String,
    pub status: StatusType,
    pub chart: Chart,
    pub uptime_pct: u32,
    pub avg_response_ms: u64,
    pub details: Option<Details>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStats {
    pub id: String,
    pub status: StatusType,
    pub uptime_pct: u32,
    pub chart: Chart,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub hosts: Vec<TargetStats>,
    pub groups: Vec<GroupStats>,
}

pub struct StatsEngine {
    store: Arc<dyn Store>,
}

impl StatsEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        StatsEngine { store }
    }

    pub async fn stats_by_id(
        &self,
        target: &Target,
        current_status: StatusType,
        day_report: bool,
    ) -> Result<TargetStats, StatsError> {
        let responses = self.store.find_responses(&target.id).await?;

        let chart = if day_report {
            gen_day_chart(&responses)
        } else {
            gen_live_chart(&responses, target.interval)
        };

        let (uptime_pct, avg_response_ms) = uptime_and_response(&chart.points);
        let details = if day_report {
            None
        } else {
            Some(gen_details(&responses))
        };

        Ok(TargetStats {
            id: target.id.clone(),
            name: target.display_name().to_string(),
            status: current_status,
            chart,
            uptime_pct,
            avg_response_ms,
            details,
        })
    }

    pub async fn response_time(&self, target_id: &str) -> Result<(Vec<String>, Vec<u64>), StatsError> {
        if !self.store.hosts().await?.iter().any(|id| id == target_id) {
            return Err(StatsError::HostNotFound(target_id.to_string()));
        }
        let responses = self.store.find_responses(target_id).await?;
        let mut by_day: BTreeMap<chrono::NaiveDate, Vec<u64>> = BTreeMap::new();
        for r in &responses {
            let day = day_of(r.timestamp);
            by_day.entry(day).or_default().push(r.duration_ms);
        }
        let mut days = Vec::new();
        let mut means = Vec::new();
        for (day, durations) in by_day {
            days.push(day.to_string());
            means.push(durations.iter().sum::<u64>() / durations.len() as u64);
        }
        Ok((days, means))
    }

    /// System-level view for `GET /`: ungrouped targets listed directly,
    /// grouped targets rolled up into one synthetic entry per group, both
    /// sorted by declared `index`.
    pub async fn stats(&self, snapshot: &[(Target, StatusType)]) -> Result<SystemStats, StatsError> {
        let mut ungrouped: Vec<&(Target, StatusType)> = Vec::new();
        let mut groups: BTreeMap<String, Vec<&(Target, StatusType)>> = BTreeMap::new();

        for entry in snapshot {
            match entry.0.group.as_deref() {
                None | Some("") => ungrouped.push(entry),
                Some(group) => groups.entry(group.to_string()).or_default().push(entry),
            }
        }

        let mut hosts = Vec::with_capacity(ungrouped.len());
        for (target, status) in &ungrouped {
            hosts.push((target.index, self.stats_by_id(target, *status, false).await?));
        }
        hosts.sort_by_key(|(index, _)| *index);
        let hosts: Vec<TargetStats> = hosts.into_iter().map(|(_, h)| h).collect();

        let mut group_stats = Vec::with_capacity(groups.len());
        for (group_name, members) in groups {
            let visible: Vec<&(Target, StatusType)> =
                members.iter().copied().filter(|(t, _)| !t.hidden).collect();
            if visible.is_empty() {
                continue;
            }

            let statuses: Vec<StatusType> = visible.iter().map(|(_, s)| *s).collect();
            let status = group_rollup(&statuses);

            let mut child_series = Vec::with_capacity(visible.len());
            let mut uptimes = Vec::with_capacity(visible.len());
            for (target, _) in &visible {
                let responses = self.store.find_responses(&target.id).await?;
                let (uptime_pct, _) = uptime_and_response(&gen_live_chart(&responses, target.interval).points);
                uptimes.push(uptime_pct);
                child_series.push(day_status_series(&responses));
            }
            let uptime_pct = if uptimes.is_empty() {
                0
            } else {
                (uptimes.iter().sum::<u32>() as f64 / uptimes.len() as f64).floor() as u32
            };

            let min_index = visible.iter().map(|(t, _)| t.index).min().unwrap_or(0);
            group_stats.push((
                min_index,
                GroupStats {
                    id: group_name,
                    status,
                    uptime_pct,
                    chart: group_chart(&child_series),
                },
            ));
        }
        group_stats.sort_by_key(|(index, _)| *index);

        Ok(SystemStats {
            hosts,
            groups: group_stats.into_iter().map(|(_, g)| g).collect(),
        })
    }
}

/// Per-day status for a target's history, including today computed on the
/// fly from its raw responses via the same collapse rule as the nightly
/// aggregator — the per-child input to the group rollup chart.
fn day_status_series(responses: &[Response]) -> BTreeMap<NaiveDate, StatusType> {
    let today = Utc::now().date_naive();
    let mut by_day: BTreeMap<NaiveDate, StatusType> = BTreeMap::new();
    let mut todays_raw = Vec::new();
    for r in responses {
        let day = day_of(r.timestamp);
        if day == today && !r.is_aggregated {
            todays_raw.push(r.clone());
        } else if r.is_aggregated {
            by_day.insert(day, r.status_type);
        }
    }
    if !todays_raw.is_empty() {
        by_day.insert(today, aggregate::collapse(today, &todays_raw).status_type);
    }
    by_day
}

/// The group-level chart: one point per day for the last 91 days, each
/// day's status the rollup over every visible child's status that day.
fn group_chart(child_series: &[BTreeMap<NaiveDate, StatusType>]) -> Chart {
    let today = Utc::now().date_naive();
    let mut points = Vec::with_capacity(DAY_CHART_POINTS);
    for offset in (0..DAY_CHART_POINTS as i64).rev() {
        let day = today - ChronoDuration::days(offset);
        let statuses: Vec<StatusType> = child_series
            .iter()
            .map(|series| series.get(&day).copied().unwrap_or(StatusType::Unknown))
            .collect();
        points.push(Point {
            timestamp: day.to_string(),
            status: group_rollup(&statuses),
            response_ms: 0,
        });
    }
    Chart {
        points,
        intervals: ["90d".into(), "60d".into(), "30d".into()],
    }
}

fn day_of(ts: i64) -> chrono::NaiveDate {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.date_naive())
        .unwrap_or_else(|| Utc::now().date_naive())
}

/// "Live" view: 90 points spaced by the target's interval, right-aligned
/// to `now` (the most recent point is the latest sample within the slot).
fn gen_live_chart(responses: &[Response], interval: std::time::Duration) -> Chart {
    let interval = ChronoDuration::from_std(interval).unwrap_or(ChronoDuration::seconds(30));
    let now = Utc::now();
    let mut points = vec![
        Point {
            timestamp: String::new(),
            status: StatusType::Unknown,
            response_ms: 0,
        };
        LIVE_CHART_POINTS
    ];

    for (i, slot) in points.iter_mut().enumerate() {
        let slot_end = now - interval * (LIVE_CHART_POINTS as i32 - 1 - i as i32);
        let slot_start = slot_end - interval;
        if let Some(r) = responses
            .iter()
            .filter(|r| r.timestamp > slot_start.timestamp() && r.timestamp <= slot_end.timestamp())
            .max_by_key(|r| r.timestamp)
        {
            slot.timestamp = slot_end.format("%Y-%m-%d %H:%M:%S").to_string();
            slot.status = r.status_type;
            slot.response_ms = r.duration_ms;
        } else {
            slot.timestamp = slot_end.format("%Y-%m-%d %H:%M:%S").to_string();
        }
    }

    let intervals = gen_intervals(interval);
    Chart { points, intervals }
}

/// "Day" view: 90 prior days from stored aggregates, plus today computed
/// on the fly from today's raw responses (same collapse rule as the
/// nightly aggregator).
fn gen_day_chart(responses: &[Response]) -> Chart {
    let today = Utc::now().date_naive();
    let mut by_day: BTreeMap<chrono::NaiveDate, Response> = BTreeMap::new();
    let mut todays_raw = Vec::new();

    for r in responses {
        let day = day_of(r.timestamp);
        if day == today && !r.is_aggregated {
            todays_raw.push(r.clone());
        } else if r.is_aggregated {
            by_day.insert(day, r.clone());
        }
    }

    let mut points = Vec::with_capacity(DAY_CHART_POINTS);
    let history_len = 90.min(by_day.len());
    let pad = 90usize.saturating_sub(by_day.len());
    for _ in 0..pad {
        points.push(Point {
            timestamp: String::new(),
            status: StatusType::Unknown,
            response_ms: 0,
        });
    }
    for (day, r) in by_day.iter().rev().take(history_len).collect::<Vec<_>>().into_iter().rev() {
        points.push(Point {
            timestamp: day.to_string(),
            status: r.status_type,
            response_ms: r.duration_ms,
        });
    }

    let today_point = if todays_raw.is_empty() {
        Point {
            timestamp: today.to_string(),
            status: StatusType::Unknown,
            response_ms: 0,
        }
    } else {
        let aggregate = aggregate::collapse(today, &todays_raw);
        Point {
            timestamp: today.to_string(),
            status: aggregate.status_type,
            response_ms: aggregate.duration_ms,
        }
    };
    points.push(today_point);

    Chart {
        points,
        intervals: ["90d".into(), "60d".into(), "30d".into()],
    }
}

fn uptime_and_response(points: &[Point]) -> (u32, u64) {
    let total = points.len();
    let unknown = points.iter().filter(|p| p.status == StatusType::Unknown).count();
    let up = points
        .iter()
        .filter(|p| p.status == StatusType::Up)
        .count();
    let denom = total.saturating_sub(unknown);
    let uptime_pct = if denom == 0 {
        0
    } else {
        ((up as f64 / denom as f64) * 100.0).floor() as u32
    };
    let known: Vec<&Point> = points.iter().filter(|p| p.status != StatusType::Unknown).collect();
    let avg_response_ms = if known.is_empty() {
        0
    } else {
        known.iter().map(|p| p.response_ms).sum::<u64>() / known.len() as u64
    };
    (uptime_pct, avg_response_ms)
}

fn gen_details(responses: &[Response]) -> Details {
    let now = Utc::now();
    let window = |duration: ChronoDuration| -> (String, String) {
        let since = (now - duration).timestamp();
        let window_responses: Vec<&Response> =
            responses.iter().filter(|r| r.timestamp >= since).collect();
        if window_responses.is_empty() {
            return ("0".into(), "0".into());
        }
        let up = window_responses
            .iter()
            .filter(|r| r.status_type != StatusType::Down)
            .count();
        let uptime = up as f64 / window_responses.len() as f64 * 100.0;
        let mean_ms = window_responses.iter().map(|r| r.duration_ms).sum::<u64>()
            / window_responses.len() as u64;
        (format_pct(uptime), mean_ms.to_string())
    };

    let (u30, r30) = window(ChronoDuration::days(30));
    let (u7, r7) = window(ChronoDuration::days(7));
    let (u24, r24) = window(ChronoDuration::hours(24));

    Details {
        uptime_30d: u30,
        uptime_7d: u7,
        uptime_24h: u24,
        response_30d_ms: r30,
        response_7d_ms: r7,
        response_24h_ms: r24,
    }
}

/// `%.0f` when the value has no fractional part, `%.1f` otherwise.
fn format_pct(value: f64) -> String {
    if value.trunc() == value {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

/// Labels at chart positions 0/30/60: for spans under 24h, round to the
/// largest whole unit (hour/minute/second); once a target probes hourly
/// or slower, the chart is read day-by-day and `N` is the slot count
/// itself (90/60/30) rather than a rounded real-time span.
fn gen_intervals(interval: ChronoDuration) -> [String; 3] {
    if interval >= ChronoDuration::hours(1) {
        return ["90d".into(), "60d".into(), "30d".into()];
    }
    let make = |slots: i64| -> String { format_duration(interval * slots as i32) };
    [make(90), make(60), make(30)]
}

/// Rounds to the largest whole unit at or below the magnitude (seconds,
/// minutes, hours), half-away-from-zero, dropping sub-unit remainders.
/// Only called for spans under 24h; callers handle the day-granularity
/// case themselves.
fn format_duration(d: ChronoDuration) -> String {
    let total_seconds = d.num_seconds().max(0) as f64;
    if total_seconds >= 3600.0 {
        return format!("{}h", (total_seconds / 3600.0).round() as i64);
    }
    if total_seconds >= 60.0 {
        return format!("{}m", (total_seconds / 60.0).round() as i64);
    }
    format!("{}s", total_seconds as i64)
}

/// Rollup over a group's current child statuses: down only when every
/// child is down, degraded when the group is mixed (any down or
/// degraded child alongside a healthy one), up when every reporting
/// child is up, and unknown when nothing in the group has reported yet.
pub fn group_rollup(children: &[StatusType]) -> StatusType {
    if children.is_empty() {
        return StatusType::Unknown;
    }
    let up = children.iter().filter(|s| **s == StatusType::Up).count();
    let down = children.iter().filter(|s| **s == StatusType::Down).count();
    let degraded = children.iter().filter(|s| **s == StatusType::Degraded).count();
    let unknown = children.iter().filter(|s| **s == StatusType::Unknown).count();

    if down == children.len() {
        return StatusType::Down;
    }
    if up > 0 && down == 0 && degraded == 0 {
        return StatusType::Up;
    }
    if down > 0 || degraded > 0 {
        return StatusType::Degraded;
    }
    if unknown == children.len() {
        return StatusType::Unknown;
    }
    StatusType::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn response_time_fails_with_host_not_found_for_unknown_id() {
        let engine = StatsEngine::new(Arc::new(MemoryStore::new()));
        let err = engine.response_time("no-such-target").await.unwrap_err();
        assert!(matches!(err, StatsError::HostNotFound(_)));
    }

    #[test]
    fn group_rollup_all_up_with_unknown() {
        let s = [StatusType::Up, StatusType::Up, StatusType::Unknown];
        assert_eq!(group_rollup(&s), StatusType::Up);
    }

    #[test]
    fn group_rollup_mixed_is_degraded() {
        let s = [StatusType::Up, StatusType::Down, StatusType::Up];
        assert_eq!(group_rollup(&s), StatusType::Degraded);
    }

    #[test]
    fn group_rollup_all_down() {
        let s = [StatusType::Down, StatusType::Down];
        assert_eq!(group_rollup(&s), StatusType::Down);
    }

    #[test]
    fn group_rollup_all_unknown() {
        let s = [StatusType::Unknown, StatusType::Unknown];
        assert_eq!(group_rollup(&s), StatusType::Unknown);
    }

    #[test]
    fn interval_labels_for_one_second_interval() {
        let labels = gen_intervals(ChronoDuration::seconds(1));
        assert_eq!(labels, ["2m".to_string(), "1m".to_string(), "30s".to_string()]);
    }

    #[test]
    fn interval_labels_for_one_hour_interval() {
        let labels = gen_intervals(ChronoDuration::hours(1));
        assert_eq!(labels, ["90d".to_string(), "60d".to_string(), "30d".to_string()]);
    }

    #[test]
    fn format_pct_strips_fraction_when_whole() {
        assert_eq!(format_pct(100.0), "100");
        assert_eq!(format_pct(66.666), "66.7");
    }
}
