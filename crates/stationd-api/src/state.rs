//! Shared application state handed to every route handler.
//!
//! Modeled on the teacher's `AppState`: a small `#[derive(Clone)]` struct of
//! `Arc`-wrapped services that axum clones into every handler via
//! `State<AppState>`.

use chrono::{DateTime, Utc};
use stationd_core::config::DaemonConfig;
use stationd_ledger::Ledger;
use stationd_provider::CloudProvider;
use stationd_scheduler::Scheduler;
use stationd_store::Store;
use std::sync::Arc;
use tokio::sync::watch;

/// Server-level settings that do not belong to the durable config file.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Hard cap on request body size, enforced by `RequestBodyLimitLayer`.
    pub max_body_size: usize,
    /// Label surfaced by `GET /api/v1/status`; not a behavior switch.
    pub region: String,
    pub profile: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024,
            region: "local".to_string(),
            profile: "default".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub scheduler: Arc<Scheduler>,
    pub ledger: Arc<Ledger>,
    pub config: Arc<DaemonConfig>,
    pub server: ServerConfig,
    pub started_at: DateTime<Utc>,
    provider: Arc<dyn CloudProvider>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl AppState {
    /// Construct the shared state plus the shutdown receiver the daemon
    /// should pass to `ApiServer::run_until` so that `POST /shutdown` can
    /// trigger axum's graceful shutdown.
    pub fn new(
        store: Arc<Store>,
        scheduler: Arc<Scheduler>,
        ledger: Arc<Ledger>,
        provider: Arc<dyn CloudProvider>,
        config: Arc<DaemonConfig>,
        server: ServerConfig,
    ) -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                store,
                scheduler,
                ledger,
                config,
                server,
                started_at: Utc::now(),
                provider,
                shutdown_tx: Arc::new(tx),
            },
            rx,
        )
    }

    /// The `CloudProvider` used for read-only probes issued directly by the
    /// API layer (`diff`), bypassing the scheduler since a diff is not a
    /// mutation.
    pub fn provider(&self) -> &dyn CloudProvider {
        self.provider.as_ref()
    }

    /// Signal graceful shutdown. Idempotent.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
