//! Liveness, status, and shutdown endpoints (spec §6).

use crate::state::AppState;
use crate::types::{PingResponse, StatusResponse};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/status", get(status))
        .route("/shutdown", post(shutdown))
}

async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let uptime_seconds = (Utc::now() - state.started_at).num_seconds();
    let active_operations = state.scheduler.list().into_iter().filter(|op| !op.state.is_terminal()).count();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        active_operations,
        region: state.server.region.clone(),
        profile: state.server.profile.clone(),
    })
}

async fn shutdown(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.request_shutdown();
    Json(serde_json::json!({ "status": "shutting-down" }))
}
