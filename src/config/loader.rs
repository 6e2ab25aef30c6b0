//! File-backed configuration loader: detects format by extension, polls
//! mtime on a background task, and pushes validated config onto a channel.
//!
//! Hot reload runs as a `tokio` task that polls the file's mtime and
//! feeds a change channel only when the content actually validates,
//! so a config file mid-write never reaches the supervisor.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::types::Cfg;
use crate::error::ConfigError;
use crate::types::{Conditions, Target, TargetKind};

pub const DEFAULT_MAX_CONN: u32 = 128;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Fully resolved configuration: concrete targets plus daemon-wide knobs.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_conn: u32,
    pub hosts: Vec<Target>,
    pub alerts: crate::config::types::AlertsConfig,
}

fn parse_duration(raw: &Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    match raw {
        None => Ok(default),
        Some(s) => humantime::parse_duration(s)
            .map_err(|e| ConfigError::Invalid(format!("bad duration '{s}': {e}"))),
    }
}

fn parse_conditions(
    raw: &Option<crate::config::types::ConditionsConfig>,
) -> Conditions {
    match raw {
        None => Conditions {
            codes: (200..=208).collect(),
            body: None,
        },
        Some(c) => Conditions {
            codes: if c.code.is_empty() {
                (200..=208).collect()
            } else {
                c.code.clone()
            },
            body: c.body.clone(),
        },
    }
}

/// Parses raw bytes by file extension, then validates and resolves into a
/// [`Config`], filling every default.
pub fn parse_and_validate(path: &Path, raw: &[u8]) -> Result<Config, ConfigError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    let cfg: Cfg = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_slice(raw).map_err(|e| ConfigError::Parse {
            format: "yaml".into(),
            reason: e.to_string(),
        })?,
        "json" => serde_json::from_slice(raw).map_err(|e| ConfigError::Parse {
            format: "json".into(),
            reason: e.to_string(),
        })?,
        other => {
            return Err(ConfigError::Invalid(format!(
                "unrecognised config extension '{other}'"
            )))
        }
    };
    validate(cfg)
}

fn validate(cfg: Cfg) -> Result<Config, ConfigError> {
    let max_conn = cfg.max_conn.unwrap_or(DEFAULT_MAX_CONN);
    let top_interval = parse_duration(&cfg.interval, DEFAULT_INTERVAL)?;
    let top_timeout = parse_duration(&cfg.timeout, DEFAULT_TIMEOUT)?;
    let top_initial_delay = parse_duration(&cfg.initial_delay, Duration::ZERO)?;
    let top_success = cfg.success_threshold.unwrap_or(DEFAULT_SUCCESS_THRESHOLD);
    let top_failure = cfg.failure_threshold.unwrap_or(DEFAULT_FAILURE_THRESHOLD);
    let top_conditions = parse_conditions(&cfg.conditions);

    let mut hosts = Vec::with_capacity(cfg.hosts.len());
    for (index, h) in cfg.hosts.into_iter().enumerate() {
        if h.url.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "host at index {index} has no url"
            )));
        }
        let group = h.group.clone().unwrap_or_default();
        let id = h
            .id
            .clone()
            .unwrap_or_else(|| crate::id::target_id(&h.url, &group));
        let kind = match h.kind.as_deref() {
            Some("http") => TargetKind::Http,
            Some("mongo") => TargetKind::Mongo,
            Some("icmp") => TargetKind::Icmp,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "unknown host type '{other}' for {}",
                    h.url
                )))
            }
            None => TargetKind::infer(&h.url),
        };

        let mut headers = cfg.headers.clone();
        headers.extend(h.headers.clone());

        hosts.push(Target {
            id,
            kind,
            url: h.url,
            method: h.method,
            headers,
            name: h.name,
            description: h.description,
            group: h.group,
            tags: h.tags,
            interval: parse_duration(&h.interval, top_interval)?,
            timeout: parse_duration(&h.timeout, top_timeout)?,
            initial_delay: parse_duration(&h.initial_delay, top_initial_delay)?,
            success_threshold: h.success_threshold.unwrap_or(top_success),
            failure_threshold: h.failure_threshold.unwrap_or(top_failure),
            conditions: h
                .conditions
                .as_ref()
                .map(parse_some_conditions)
                .unwrap_or_else(|| top_conditions.clone()),
            alerts: h.alerts,
            hidden: h.hidden,
            index,
        });
    }

    Ok(Config {
        max_conn,
        hosts,
        alerts: cfg.alerts,
    })
}

fn parse_some_conditions(c: &crate::config::types::ConditionsConfig) -> Conditions {
    parse_conditions(&Some(c.clone()))
}

/// Polls `path`'s mtime once a second; on change, re-reads, re-validates and
/// pushes the new [`Config`] onto the returned channel. An invalid reload is
/// logged and the previous config stays in effect (the channel is simply
/// not written to for that tick).
pub fn watch(path: PathBuf) -> mpsc::Receiver<Config> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut last_mtime = None;
        loop {
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                let mtime = meta.modified().ok();
                if mtime != last_mtime {
                    last_mtime = mtime;
                    match tokio::fs::read(&path).await {
                        Ok(raw) => match parse_and_validate(&path, &raw) {
                            Ok(cfg) => {
                                if tx.send(cfg).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "config reload rejected, keeping previous config");
                            }
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, path = %path.display(), "failed to read config file");
                        }
                    }
                }
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });
    rx
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn watch(path: impl Into<PathBuf>) -> mpsc::Receiver<Config> {
        watch(path.into())
    }

    pub async fn load_once(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
        parse_and_validate(path, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_defaults() {
        let cfg = Cfg::default();
        let resolved = validate(cfg).unwrap();
        assert_eq!(resolved.max_conn, DEFAULT_MAX_CONN);
    }

    #[test]
    fn host_inherits_top_level_interval() {
        let mut cfg = Cfg::default();
        cfg.interval = Some("10s".into());
        cfg.hosts.push(crate::config::types::HostConfig {
            url: "https://example.com".into(),
            ..Default::default()
        });
        let resolved = validate(cfg).unwrap();
        assert_eq!(resolved.hosts[0].interval, Duration::from_secs(10));
    }

    #[test]
    fn infers_icmp_for_dotted_ipv4() {
        let mut cfg = Cfg::default();
        cfg.hosts.push(crate::config::types::HostConfig {
            url: "192.168.1.1".into(),
            ..Default::default()
        });
        let resolved = validate(cfg).unwrap();
        assert_eq!(resolved.hosts[0].kind, TargetKind::Icmp);
    }

    #[test]
    fn rejects_empty_url() {
        let mut cfg = Cfg::default();
        cfg.hosts.push(crate::config::types::HostConfig::default());
        assert!(validate(cfg).is_err());
    }
}
