//! Centralized `StationError` -> HTTP response mapping (spec §6's error
//! envelope: `{ "error": { "kind", "message", "retryable", "details" } }`).
//!
//! The teacher's `ApiError` is a flat `{ code, message, details, request_id }`
//! shape built per-route with `ApiError::new(error_codes::X, ...)`; this
//! crate instead implements `IntoResponse` once for `StationError` and lets
//! every handler return `Result<Json<T>, ApiError>`, since every error a
//! handler can produce already carries a `stationd_core::ErrorKind`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use stationd_core::StationError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    retryable: bool,
    details: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// Newtype so a foreign `StationError` can implement axum's local
/// `IntoResponse` trait.
#[derive(Debug)]
pub struct ApiError(pub StationError);

impl From<StationError> for ApiError {
    fn from(err: StationError) -> Self {
        Self(err)
    }
}

impl From<stationd_store::StoreError> for ApiError {
    fn from(err: stationd_store::StoreError) -> Self {
        Self(err.into())
    }
}

impl From<stationd_template::TemplateError> for ApiError {
    fn from(err: stationd_template::TemplateError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = match &self.0.remediation {
            Some(hint) => json!({ "remediation": hint }),
            None => json!({}),
        };
        let body = ErrorEnvelope {
            error: ErrorBody {
                kind: self.0.kind.to_string(),
                message: self.0.message.clone(),
                retryable: self.0.is_retryable(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
