//! Idle policy CRUD and the idle engine's decision log (spec §4.H).
//!
//! Idle policies are plain store-backed entities, not `OperationKind`
//! variants — there is no async provider work involved in creating one, so
//! these handlers talk to the store directly rather than through the
//! scheduler. Create/list/get are a necessary supplement beyond the literal
//! spec text (which only names the decision log): without them a
//! `LaunchRequest.idle_policy` reference could never be satisfied.

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::CreateIdlePolicyRequest;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use stationd_core::domain::{IdleDecision, IdlePolicy};
use stationd_core::ids::IdlePolicyId;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_policy))
        .route("/:id/decisions", get(decisions))
}

async fn create(State(state): State<AppState>, Json(body): Json<CreateIdlePolicyRequest>) -> Result<Json<IdlePolicy>, ApiError> {
    Ok(Json(state.store.put_idle_policy(body.into_policy())?))
}

async fn list(State(state): State<AppState>) -> Json<Vec<IdlePolicy>> {
    Json(state.store.list_idle_policies())
}

async fn get_policy(State(state): State<AppState>, Path(id): Path<IdlePolicyId>) -> Result<Json<IdlePolicy>, ApiError> {
    Ok(Json(state.store.get_idle_policy(&id)?))
}

#[derive(Debug, Deserialize)]
struct DecisionsQuery {
    workstation: Option<String>,
}

async fn decisions(
    State(state): State<AppState>,
    Path(_id): Path<IdlePolicyId>,
    Query(query): Query<DecisionsQuery>,
) -> Json<Vec<IdleDecision>> {
    Json(state.store.list_idle_decisions(query.workstation.as_deref()))
}
