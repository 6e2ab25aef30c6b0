use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use watchkeep::api::{self, ApiState};
use watchkeep::cli::Cli;
use watchkeep::config::ConfigLoader;
use watchkeep::error::MonitorError;
use watchkeep::notify::Notifier;
use watchkeep::stats::StatsEngine;
use watchkeep::store::{MemoryStore, SledStore, Store};
use watchkeep::supervisor::Supervisor;

fn main() {
    let cli = Cli::parse_args();
    init_tracing(&cli.log_level);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = match runtime.block_on(run(cli)) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "watchkeepd exiting");
            e.exit_code()
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> Result<(), MonitorError> {
    let store: Arc<dyn Store> = if cli.store == ":memory:" {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SledStore::open(&cli.store).map_err(MonitorError::Store)?)
    };

    let initial_config = ConfigLoader::load_once(&cli.config)
        .await
        .map_err(MonitorError::Config)?;

    let notifier = Arc::new(Notifier::from_config(&initial_config.alerts).map_err(MonitorError::Notify)?);
    let supervisor = Arc::new(Supervisor::new(Arc::clone(&store), Arc::clone(&notifier)));
    let stats = Arc::new(StatsEngine::new(Arc::clone(&store)));

    notifier.startup().await;
    supervisor.reconcile(&initial_config).await;
    let aggregator_handle = supervisor.spawn_aggregator();

    let mut config_updates = ConfigLoader::watch(cli.config.clone());
    let reload_supervisor = Arc::clone(&supervisor);
    let reload_handle = tokio::spawn(async move {
        while let Some(config) = config_updates.recv().await {
            tracing::info!(hosts = config.hosts.len(), "reconciling against reloaded config");
            reload_supervisor.reconcile(&config).await;
        }
    });

    let app = api::router(ApiState {
        supervisor: Arc::clone(&supervisor),
        stats,
    });
    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .map_err(|e| MonitorError::Runtime(format!("failed to bind {}: {e}", cli.bind)))?;
    tracing::info!(addr = %cli.bind, "query API listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "query API server stopped unexpectedly");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    reload_handle.abort();
    aggregator_handle.abort();
    supervisor.shutdown().await;
    notifier.shutdown().await;
    if let Err(e) = store.close().await {
        tracing::warn!(error = %e, "error closing store");
    }

    Ok(())
}
