//! Project and budget endpoints (spec §4.D / §6).

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{CreateProjectRequest, PrecheckRequest, PrecheckResponse};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use stationd_core::domain::Project;
use stationd_core::ids::ProjectId;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_project))
        .route("/:id/precheck", post(precheck))
}

async fn create(State(state): State<AppState>, Json(body): Json<CreateProjectRequest>) -> Result<Json<Project>, ApiError> {
    let mut project = Project::new(body.name, body.owner);
    project.budget = body.budget;
    Ok(Json(state.store.upsert_project(project)?))
}

async fn list(State(state): State<AppState>) -> Json<Vec<Project>> {
    Json(state.store.list_projects())
}

async fn get_project(State(state): State<AppState>, Path(id): Path<ProjectId>) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.store.get_project(&id)?))
}

async fn precheck(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    Json(body): Json<PrecheckRequest>,
) -> Result<Json<PrecheckResponse>, ApiError> {
    let allowed = state.ledger.precheck(&state.store, &id, body.estimated_cost).is_ok();
    let remaining = state.ledger.remaining(&state.store, &id)?;
    Ok(Json(PrecheckResponse { allowed, remaining }))
}
