//! Wires the route tree, middleware, and bind address together.
//!
//! Modeled on the teacher's `api::server::ApiServer`: a config struct, a
//! `build_router` that layers middleware in reverse-apply order, and
//! `run`/`run_until` wrapping `axum::serve`. Dropped relative to the
//! teacher: auth, CORS, and rate-limit middleware, none of which apply to a
//! loopback control-plane daemon with no external callers.

use crate::middleware::request_id_middleware;
use crate::routes::api_router;
use crate::state::AppState;
use axum::{middleware, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
        }
    }
}

impl ApiConfig {
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }
}

pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
    router: Router,
}

impl ApiServer {
    pub fn new(state: AppState, config: ApiConfig) -> Self {
        let router = Self::build_router(state.clone());
        Self { config, state, router }
    }

    fn build_router(state: AppState) -> Router {
        let max_body_size = state.server.max_body_size;
        let router = api_router(state)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(request_id_middleware));

        // Applied last so it runs first, rejecting oversized bodies before
        // any handler or JSON decoding runs.
        router.layer(RequestBodyLimitLayer::new(max_body_size))
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "stationd API listening");
        axum::serve(listener, self.router).await
    }

    pub async fn run_until<F>(self, shutdown_signal: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "stationd API listening");
        axum::serve(listener, self.router).with_graceful_shutdown(shutdown_signal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    struct NoopExecutor;

    #[async_trait::async_trait]
    impl stationd_scheduler::OperationExecutor for NoopExecutor {
        async fn execute(
            &self,
            _operation: &stationd_core::domain::Operation,
            _handle: &stationd_scheduler::ExecutionHandle,
        ) -> stationd_core::Result<()> {
            Ok(())
        }
    }

    fn test_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(stationd_store::Store::open(dir.path()).unwrap());
        let config = stationd_core::config::DaemonConfig::default();
        let scheduler = stationd_scheduler::Scheduler::new(
            store.clone(),
            Arc::new(NoopExecutor),
            Arc::new(stationd_scheduler::AlwaysAdmit),
            config.clone(),
        )
        .unwrap();
        let ledger = Arc::new(stationd_ledger::Ledger::new(0.1));
        let provider: Arc<dyn stationd_provider::CloudProvider> = Arc::new(stationd_provider::mock::MockCloudProvider::new());
        let (state, _shutdown_rx) = AppState::new(store, scheduler, ledger, provider, Arc::new(config), ServerConfig::default());
        state
    }

    #[tokio::test]
    async fn ping_returns_ok() {
        let server = ApiServer::new(test_state(), ApiConfig::default().with_port(0));
        let router = server.router();

        let request = Request::builder().uri("/api/v1/ping").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_workstation_is_404() {
        let server = ApiServer::new(test_state(), ApiConfig::default().with_port(0));
        let router = server.router();

        let request = Request::builder().uri("/api/v1/workstations/nope").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
