// Copyright 2026 Stationd contributors

//! Wires every crate in the workspace into the running `stationd` process:
//! loads configuration, opens the durable store, constructs the scheduler
//! with its composite executor and ledger-backed admission gate, starts the
//! idle and cost-accrual background loops, and serves the HTTP API until a
//! shutdown signal arrives.

mod admission;
mod cli;
mod executor;

use admission::LedgerGate;
use chrono::Utc;
use clap::Parser;
use cli::{Cli, LogFormat};
use executor::CompositeExecutor;
use stationd_api::state::ServerConfig;
use stationd_api::{ApiConfig, ApiServer, AppState};
use stationd_core::config::DaemonConfig;
use stationd_ledger::Ledger;
use stationd_lifecycle::{probe_capabilities, LifecycleExecutor};
use stationd_provider::mock::{MockCloudProvider, MockMetricsSource};
use stationd_provider::{CloudProvider, MetricsSource};
use stationd_scheduler::Scheduler;
use stationd_store::Store;
use stationd_template::TemplateExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stationd=info,tower_http=info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config_dir = cli.config_dir.unwrap_or_else(DaemonConfig::config_dir);
    let mut config = DaemonConfig::load_from(&config_dir)?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    info!(config_dir = %config_dir.display(), port = config.port, "starting stationd");

    let store = Arc::new(Store::open(config_dir.clone())?);

    // A real cloud SDK integration is out of scope (spec Non-goals); the
    // daemon always runs against the in-process mock provider/metrics
    // source until a concrete backend is wired in by an operator.
    let provider: Arc<dyn CloudProvider> = Arc::new(MockCloudProvider::new());
    let metrics: Arc<dyn MetricsSource> = Arc::new(MockMetricsSource::new());

    let capabilities = probe_capabilities(provider.as_ref()).await?;
    info!(?capabilities, "provider capabilities probed");

    let ledger = Arc::new(Ledger::new(config.stopped_cost_ratio));
    let admission = Arc::new(LedgerGate::new(store.clone(), ledger.clone()));

    let lifecycle = LifecycleExecutor::new(store.clone(), provider.clone());
    let template = TemplateExecutor::new(store.clone(), provider.clone());
    let composite = Arc::new(CompositeExecutor::new(lifecycle, template));

    let scheduler = Scheduler::new(store.clone(), composite, admission, config.clone())?;

    let server_config = ServerConfig {
        max_body_size: 2 * 1024 * 1024,
        region: "local".to_string(),
        profile: "default".to_string(),
    };
    let (state, shutdown_rx) = AppState::new(
        store.clone(),
        scheduler.clone(),
        ledger.clone(),
        provider.clone(),
        Arc::new(config.clone()),
        server_config,
    );

    let idle_engine = Arc::new(stationd_idle::IdleEngine::new(store.clone(), metrics.clone(), scheduler.clone()));
    tokio::spawn(stationd_idle::run(
        idle_engine,
        scheduler.clone(),
        config.idle_evaluation_interval_seconds,
        shutdown_rx.clone(),
    ));

    tokio::spawn(accrue_cost_loop(store.clone(), ledger.clone(), shutdown_rx.clone()));

    let api_config = ApiConfig::default().with_port(config.port);
    let server = ApiServer::new(state, api_config);

    info!(addr = %server.addr(), "stationd API listening");
    if let Err(err) = server.run_until(shutdown_signal(shutdown_rx)).await {
        error!(%err, "API server exited with an error");
    }

    info!("stationd shutdown complete");
    Ok(())
}

/// Accrue per-minute workstation cost on a fixed tick until shutdown.
async fn accrue_cost_loop(store: Arc<Store>, ledger: Arc<Ledger>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = ledger.accrue(&store, Utc::now()) {
                    warn!(%err, "cost accrual tick failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Resolves once any of: Ctrl+C, SIGTERM, or the `/shutdown` endpoint
/// flips the state's internal watch channel.
async fn shutdown_signal(mut internal: tokio::sync::watch::Receiver<bool>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let internal_trigger = async move {
        loop {
            if *internal.borrow() {
                return;
            }
            if internal.changed().await.is_err() {
                return;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
        _ = internal_trigger => info!("shutdown requested via API"),
    }
}
