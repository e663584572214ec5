//! Workstation lifecycle, template, and layer-history endpoints (spec §6).

use super::support::{maybe_await, resolve_idle_policy};
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{ApplyRequest, DiffRequest, ExecRequestBody, LaunchRequest, ResizeRequest, RollbackRequest, TransitionRequest};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use stationd_core::domain::{LayerRecord, Operation, OperationKind, Workstation, WorkstationState};
use stationd_core::StationError;
use stationd_template::{compute_diff, probe_workstation, TemplateDiff};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(launch).get(list))
        .route("/:name", get(get_workstation))
        .route("/:name/:action", post(transition))
        .route("/:name/hibernation-status", get(hibernation_status))
        .route("/:name/apply", post(apply))
        .route("/:name/diff", post(diff))
        .route("/:name/rollback", post(rollback))
        .route("/:name/layers", get(layers))
}

async fn launch(State(state): State<AppState>, Json(body): Json<LaunchRequest>) -> Result<Json<LaunchResponse>, ApiError> {
    let idle_policy = body
        .idle_policy
        .as_deref()
        .map(|reference| resolve_idle_policy(&state.store, reference))
        .transpose()?;

    let params = json!({
        "size": body.size,
        "lifecycle_kind": body.lifecycle_kind,
        "project": body.project,
        "os_family": body.os_family,
        "os_version": body.os_version,
        "arch": body.arch,
        "idle_policy": idle_policy,
    });

    let budget = body.project.map(|project| {
        let cost = body.estimated_daily_cost.unwrap_or_else(|| stationd_ledger::pricing::hourly_rate(&body.size) * 24.0);
        (project, cost)
    });

    let launch_op = state.scheduler.submit(OperationKind::Launch, body.name.clone(), params, "api", budget).await?;

    let apply_op = match &body.template {
        Some(template_name) => {
            let apply_params = json!({
                "template_name": template_name,
                "template_version": body.template_version,
                "parameters": body.parameters,
                "dry_run": body.dry_run,
                "force": false,
            });
            Some(
                state
                    .scheduler
                    .submit(OperationKind::ApplyTemplate, body.name.clone(), apply_params, "api", None)
                    .await?,
            )
        }
        None => None,
    };

    let launch_op = maybe_await(&state.scheduler, launch_op, body.wait).await?;
    let apply_op = match apply_op {
        Some(op) => Some(maybe_await(&state.scheduler, op, body.wait).await?),
        None => None,
    };

    Ok(Json(LaunchResponse { launch: launch_op, apply: apply_op }))
}

#[derive(Debug, Serialize)]
struct LaunchResponse {
    launch: Operation,
    apply: Option<Operation>,
}

async fn list(State(state): State<AppState>) -> Json<Vec<Workstation>> {
    Json(state.store.list_workstations())
}

async fn get_workstation(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Workstation>, ApiError> {
    Ok(Json(state.store.get_workstation(&name)?))
}

async fn transition(
    State(state): State<AppState>,
    Path((name, action)): Path<(String, String)>,
    body: axum::body::Bytes,
) -> Result<Json<Operation>, ApiError> {
    match action.as_str() {
        "stop" | "start" | "hibernate" | "resume" | "delete" => {
            let kind = match action.as_str() {
                "stop" => OperationKind::Stop,
                "start" => OperationKind::Start,
                "hibernate" => OperationKind::Hibernate,
                "resume" => OperationKind::Resume,
                "delete" => OperationKind::Delete,
                _ => unreachable!(),
            };
            let request: TransitionRequest = parse_body_or_default(&body)?;
            let op = state.scheduler.submit(kind, name, json!({}), "api", None).await?;
            Ok(Json(maybe_await(&state.scheduler, op, request.wait).await?))
        }
        "resize" => {
            let request: ResizeRequest = parse_body(&body)?;
            let workstation = state.store.get_workstation(&name)?;
            let budget = workstation
                .project
                .map(|project| (project, stationd_ledger::pricing::hourly_rate(&request.size) * 24.0));
            let params = json!({ "size": request.size });
            let op = state.scheduler.submit(OperationKind::Resize, name, params, "api", budget).await?;
            Ok(Json(maybe_await(&state.scheduler, op, request.wait).await?))
        }
        "exec" => {
            let request: ExecRequestBody = parse_body(&body)?;
            let params = json!({ "command": request.command, "args": request.args, "read_only": request.read_only });
            let op = state.scheduler.submit(OperationKind::Exec, name, params, "api", None).await?;
            Ok(Json(maybe_await(&state.scheduler, op, request.wait).await?))
        }
        other => Err(StationError::validation(format!("unknown workstation action {other}")).into()),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(bytes: &axum::body::Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(bytes).map_err(|err| StationError::validation(format!("invalid request body: {err}")).into())
}

fn parse_body_or_default<T: serde::de::DeserializeOwned + Default>(bytes: &axum::body::Bytes) -> Result<T, ApiError> {
    if bytes.is_empty() {
        Ok(T::default())
    } else {
        parse_body(bytes)
    }
}

#[derive(Debug, Serialize)]
struct HibernationStatus {
    hibernation_capable: bool,
    is_hibernated: bool,
    state: WorkstationState,
}

async fn hibernation_status(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<HibernationStatus>, ApiError> {
    let workstation = state.store.get_workstation(&name)?;
    Ok(Json(HibernationStatus {
        hibernation_capable: workstation.hibernation_capable,
        is_hibernated: workstation.state == WorkstationState::Hibernated,
        state: workstation.state,
    }))
}

async fn apply(State(state): State<AppState>, Path(name): Path<String>, Json(body): Json<ApplyRequest>) -> Result<Json<Operation>, ApiError> {
    let workstation = state.store.get_workstation(&name)?;
    let budget = workstation
        .project
        .map(|project| (project, stationd_ledger::pricing::hourly_rate(&workstation.size) * 24.0));
    let params = json!({
        "template_name": body.template_name,
        "template_version": body.template_version,
        "parameters": body.parameters,
        "dry_run": body.dry_run,
        "force": body.force,
    });
    let op = state.scheduler.submit(OperationKind::ApplyTemplate, name, params, "api", budget).await?;
    Ok(Json(maybe_await(&state.scheduler, op, body.wait).await?))
}

async fn diff(State(state): State<AppState>, Path(name): Path<String>, Json(body): Json<DiffRequest>) -> Result<Json<TemplateDiff>, ApiError> {
    let workstation = state.store.get_workstation(&name)?;
    let provider_id = workstation
        .provider_id
        .ok_or_else(|| StationError::conflict(format!("workstation {name} has no provider id yet")))?;
    let version = body
        .template_version
        .as_deref()
        .map(semver::Version::parse)
        .transpose()
        .map_err(|err| StationError::validation(format!("invalid template_version: {err}")))?;
    let (template, _origin) = stationd_template::resolve(&state.store, &body.template_name, version.as_ref())?;

    let cancel = stationd_core::CancellationToken::new();
    let observed = probe_workstation(state.provider(), &provider_id, &cancel).await?;
    Ok(Json(compute_diff(&template, &observed, body.force)))
}

async fn rollback(State(state): State<AppState>, Path(name): Path<String>, Json(body): Json<RollbackRequest>) -> Result<Json<Operation>, ApiError> {
    let params = json!({ "checkpoint": body.checkpoint });
    let op = state.scheduler.submit(OperationKind::Rollback, name, params, "api", None).await?;
    Ok(Json(maybe_await(&state.scheduler, op, body.wait).await?))
}

async fn layers(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Vec<LayerRecord>>, ApiError> {
    Ok(Json(state.store.get_workstation(&name)?.layers))
}
