//! The data model: targets, probe responses, incidents and status.
//!
//! `StatusType` is a small `Default`-able enum threaded through the whole
//! system: dialers classify a probe into it, the watcher's state machine
//! transitions on it, and the stats engine rolls groups of it up.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusType {
    #[default]
    Unknown,
    Up,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Http,
    Mongo,
    Icmp,
}

impl TargetKind {
    /// Infers the probe kind from a bare URL when the config omits it.
    pub fn infer(url: &str) -> Self {
        if url.starts_with("mongodb://") || url.starts_with("mongodb+srv://") {
            TargetKind::Mongo
        } else if is_dotted_ipv4_without_scheme(url) {
            TargetKind::Icmp
        } else {
            TargetKind::Http
        }
    }
}

fn is_dotted_ipv4_without_scheme(s: &str) -> bool {
    if s.contains("://") {
        return false;
    }
    let host = s.split(':').next().unwrap_or(s);
    host.parse::<std::net::Ipv4Addr>().is_ok()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Conditions {
    /// Acceptable HTTP-ish status codes (inclusive range collapsed to a set).
    pub codes: Vec<u16>,
    /// Optional exact-match body requirement.
    pub body: Option<String>,
}

impl Conditions {
    pub fn matches(&self, code: u16, body: Option<&[u8]>) -> bool {
        let code_ok = self.codes.is_empty() || self.codes.contains(&code);
        let body_ok = match (&self.body, body) {
            (None, _) => true,
            (Some(expected), Some(actual)) => expected.as_bytes() == actual,
            (Some(_), None) => false,
        };
        code_ok && body_ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub kind: TargetKind,
    pub url: String,
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub group: Option<String>,
    pub tags: Vec<String>,
    pub interval: std::time::Duration,
    pub timeout: std::time::Duration,
    pub initial_delay: std::time::Duration,
    pub success_threshold: u32,
    pub failure_threshold: u32,
    pub conditions: Conditions,
    pub alerts: Vec<String>,
    pub hidden: bool,
    pub index: usize,
}

impl Target {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    pub fn predicate(&self, code: u16, body: Option<&[u8]>) -> bool {
        self.conditions.matches(code, body)
    }

    pub fn wants_transport(&self, transport: &str) -> bool {
        self.alerts.is_empty() || self.alerts.iter().any(|a| a == transport)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingBreakdown {
    pub dns_ms: Option<u64>,
    pub connect_ms: Option<u64>,
    pub tls_ms: Option<u64>,
    pub ttfb_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// UTC unix-seconds timestamp; unique within a target's history.
    pub timestamp: i64,
    pub duration_ms: u64,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    pub ok: bool,
    pub bytes: u64,
    pub status: bool,
    pub status_type: StatusType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimingBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_expires_at: Option<i64>,
    #[serde(default)]
    pub is_aggregated: bool,
    #[serde(default = "default_uptime_fraction")]
    pub uptime_fraction: f64,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_uptime_fraction() -> f64 {
    1.0
}
fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: u64,
    pub start_ts: i64,
    pub end_ts: Option<i64>,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.end_ts.is_none()
    }
}
