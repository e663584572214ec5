//! Volume CRUD and attachment endpoints (spec §6). Mounted at both
//! `/api/v1/volumes` and `/api/v1/storage` by `routes::mod` — two names for
//! the same router.

use super::support::maybe_await;
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{CreateVolumeRequest, VolumeAttachmentRequest};
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use stationd_core::domain::{Operation, OperationKind, Volume};
use stationd_core::ids::VolumeId;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_volume).delete(delete_volume))
        .route("/:id/attach", post(attach))
        .route("/:id/detach", post(detach))
}

async fn create(State(state): State<AppState>, Json(body): Json<CreateVolumeRequest>) -> Result<Json<Operation>, ApiError> {
    let volume_id = VolumeId::new();
    let params = json!({
        "kind": body.kind,
        "size_gb": body.size_gb,
        "performance_tier": body.performance_tier,
    });
    let op = state.scheduler.submit(OperationKind::CreateVolume, volume_id.to_string(), params, "api", None).await?;
    Ok(Json(maybe_await(&state.scheduler, op, body.wait).await?))
}

async fn list(State(state): State<AppState>) -> Json<Vec<Volume>> {
    Json(state.store.list_volumes())
}

async fn get_volume(State(state): State<AppState>, Path(id): Path<VolumeId>) -> Result<Json<Volume>, ApiError> {
    Ok(Json(state.store.get_volume(&id)?))
}

async fn delete_volume(State(state): State<AppState>, Path(id): Path<VolumeId>) -> Result<Json<Operation>, ApiError> {
    let op = state.scheduler.submit(OperationKind::DeleteVolume, id.to_string(), json!({}), "api", None).await?;
    Ok(Json(op))
}

async fn attach(
    State(state): State<AppState>,
    Path(id): Path<VolumeId>,
    Json(body): Json<VolumeAttachmentRequest>,
) -> Result<Json<Operation>, ApiError> {
    let params = json!({ "volume_id": id });
    let op = state.scheduler.submit(OperationKind::AttachVolume, body.workstation, params, "api", None).await?;
    Ok(Json(maybe_await(&state.scheduler, op, body.wait).await?))
}

async fn detach(
    State(state): State<AppState>,
    Path(id): Path<VolumeId>,
    Json(body): Json<VolumeAttachmentRequest>,
) -> Result<Json<Operation>, ApiError> {
    let params = json!({ "volume_id": id });
    let op = state.scheduler.submit(OperationKind::DetachVolume, body.workstation, params, "api", None).await?;
    Ok(Json(maybe_await(&state.scheduler, op, body.wait).await?))
}
