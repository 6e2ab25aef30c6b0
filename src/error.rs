//! Component error enums plus the top-level error `main` maps to an exit code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialerError {
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),
    #[error("connection failed: {0}")]
    Dial(String),
    #[error("read error: {0}")]
    Read(String),
    #[error("transport error: {0}")]
    Other(String),
}

impl DialerError {
    /// Maps a transport failure onto the synthetic status code the
    /// watcher's predicate sees, so a DNS failure or timeout flows
    /// through the same threshold state machine as a bad response.
    pub fn synthetic_code(&self) -> u16 {
        match self {
            DialerError::Timeout(_) => 522,
            DialerError::Dial(_) => 523,
            DialerError::Read(_) => 521,
            DialerError::Other(_) => 503,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend I/O error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("unknown target: {0}")]
    UnknownTarget(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport {transport} failed: {reason}")]
    Transport { transport: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config ({format}): {reason}")]
    Parse { format: String, reason: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("no such target: {0}")]
    HostNotFound(String),
    #[error("store error computing stats: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("supervisor failed to start: {0}")]
    Supervisor(String),
    #[error("failed to create notifier: {0}")]
    Notify(#[from] NotifyError),
    #[error("fatal runtime error: {0}")]
    Runtime(String),
}

impl MonitorError {
    /// Exit code contract for process shutdown.
    pub fn exit_code(&self) -> i32 {
        match self {
            MonitorError::Config(_) | MonitorError::Store(_) => 1,
            MonitorError::Supervisor(_) | MonitorError::Notify(_) => 2,
            MonitorError::Runtime(_) => 3,
        }
    }
}
