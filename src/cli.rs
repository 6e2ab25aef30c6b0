//! Daemon bootstrap flags, layered on top of the file-based target
//! configuration.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "watchkeepd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Uptime-monitoring daemon: probes targets, tracks incidents, serves stats")]
pub struct Cli {
    /// Path to the target configuration file (YAML or JSON, by extension).
    #[arg(short = 'c', long = "config", default_value = "watchkeep.yaml")]
    pub config: PathBuf,

    /// Address the query API listens on.
    #[arg(short = 'b', long = "bind", default_value = "127.0.0.1:8090")]
    pub bind: String,

    /// `tracing-subscriber` env-filter directive, overridden by `RUST_LOG` if set.
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,

    /// Path to the persistent response/incident store. Pass `:memory:` to
    /// run with the in-memory backend (no persistence across restarts).
    #[arg(short = 's', long = "store", default_value = "watchkeep.db")]
    pub store: String,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
