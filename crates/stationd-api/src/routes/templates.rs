//! Template registry endpoints (spec §6).

use super::support::maybe_await;
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::SnapshotRequest;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use stationd_core::domain::{Operation, OperationKind, Template};
use stationd_store::StoredTemplate;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/:name", get(get_latest))
        .route("/snapshot", post(snapshot))
}

async fn list(State(state): State<AppState>) -> Json<Vec<StoredTemplate>> {
    Json(state.store.list_templates())
}

async fn get_latest(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Template>, ApiError> {
    let (template, _origin) = stationd_template::resolve(&state.store, &name, None)?;
    Ok(Json(template))
}

async fn snapshot(State(state): State<AppState>, Json(body): Json<SnapshotRequest>) -> Result<Json<Operation>, ApiError> {
    let params = json!({ "template_name": body.template_name });
    let op = state.scheduler.submit(OperationKind::SnapshotTemplate, body.workstation, params, "api", None).await?;
    Ok(Json(maybe_await(&state.scheduler, op, body.wait).await?))
}
