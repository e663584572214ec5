//! Operation inspection and event streaming (spec §4.E / §6).
//!
//! `events` streams newline-delimited JSON instead of the teacher's SSE
//! (`dashflow-langserve::handler::stream_handler`'s `async_stream::stream!`
//! pattern, adapted from `Event` framing to raw NDJSON lines) since spec §6
//! asks for an NDJSON body, not an SSE one.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use stationd_core::domain::Operation;
use stationd_core::ids::OperationId;
use std::time::Duration;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/:id", get(get_operation))
        .route("/:id/cancel", post(cancel))
        .route("/:id/events", get(events))
}

async fn list(State(state): State<AppState>) -> Json<Vec<Operation>> {
    Json(state.scheduler.list())
}

async fn get_operation(State(state): State<AppState>, Path(id): Path<OperationId>) -> Result<Json<Operation>, ApiError> {
    Ok(Json(state.scheduler.get(&id)?))
}

async fn cancel(State(state): State<AppState>, Path(id): Path<OperationId>) -> Result<Json<Operation>, ApiError> {
    Ok(Json(state.scheduler.cancel(&id)?))
}

/// Stream an operation's progress as NDJSON: one `{"event": "progress", ...}`
/// line per `ProgressEvent`, a 15s `{"event": "keep-alive"}` line whenever
/// the operation is quiet, and a final `{"event": "complete", "operation":
/// ...}` line once the operation reaches a terminal state.
async fn events(State(state): State<AppState>, Path(id): Path<OperationId>) -> Result<Response, ApiError> {
    let (backlog, mut receiver) = state.scheduler.subscribe(&id)?;

    let stream = async_stream::stream! {
        for event in backlog {
            yield Ok::<_, std::convert::Infallible>(ndjson_line(&json!({ "event": "progress", "data": event })));
        }

        loop {
            let operation = match state.scheduler.get(&id) {
                Ok(operation) => operation,
                Err(_) => break,
            };
            if operation.state.is_terminal() {
                yield Ok(ndjson_line(&json!({ "event": "complete", "operation": operation })));
                break;
            }

            tokio::select! {
                received = receiver.recv() => {
                    match received {
                        Ok(event) => yield Ok(ndjson_line(&json!({ "event": "progress", "data": event }))),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            if let Ok(operation) = state.scheduler.get(&id) {
                                yield Ok(ndjson_line(&json!({ "event": "complete", "operation": operation })));
                            }
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    yield Ok(ndjson_line(&json!({ "event": "keep-alive" })));
                }
            }
        }
    };

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(stream),
    )
        .into_response())
}

fn ndjson_line(value: &serde_json::Value) -> axum::body::Bytes {
    let mut line = serde_json::to_vec(value).unwrap_or_default();
    line.push(b'\n');
    axum::body::Bytes::from(line)
}
