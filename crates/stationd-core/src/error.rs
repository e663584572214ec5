//! The error taxonomy shared across the daemon (spec §7).
//!
//! Every crate in the workspace surfaces its internal failures as a
//! `thiserror`-derived enum of its own (`StoreError`, `TemplateError`, ...);
//! this module is where those collapse into the handful of *kinds* that the
//! scheduler uses to decide whether to retry and that the API layer uses to
//! pick an HTTP status.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The coarse classification of an error, used for retry decisions and HTTP
/// status mapping. This is a classification, not a type hierarchy — most
/// call sites construct a [`StationError`] with one of these kinds attached
/// rather than matching on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request was malformed or failed validation.
    Validation,
    /// The referenced entity does not exist.
    NotFound,
    /// A precondition failed: the target is not in a state that permits
    /// the requested transition.
    Conflict,
    /// Another mutating operation for the same target is already running.
    Busy,
    /// The project's hard budget would be exceeded.
    BudgetExceeded,
    /// The cloud provider reported a transient failure; retryable.
    CloudTransient,
    /// The cloud provider reported a permanent failure.
    CloudPermanent,
    /// The operation exceeded its wall-clock or per-call timeout.
    Timeout,
    /// The operation was canceled by its submitter or by daemon shutdown.
    Canceled,
    /// An unclassified internal failure (bug, I/O failure, corrupt state).
    Internal,
}

impl ErrorKind {
    /// Whether the scheduler should retry an operation that failed with
    /// this kind, per spec §4.E's retry policy.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::CloudTransient | ErrorKind::Timeout)
    }

    /// The HTTP status this kind maps to (spec §7's error envelope).
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Busy => 409,
            ErrorKind::BudgetExceeded => 402,
            ErrorKind::CloudTransient => 503,
            ErrorKind::CloudPermanent => 502,
            ErrorKind::Timeout => 504,
            ErrorKind::Canceled => 499,
            ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Busy => "busy",
            ErrorKind::BudgetExceeded => "budget_exceeded",
            ErrorKind::CloudTransient => "cloud_transient",
            ErrorKind::CloudPermanent => "cloud_permanent",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// The error type threaded through every public fallible operation in the
/// daemon once it crosses a component boundary (scheduler, API, lifecycle
/// engine, ...). Internal crates may keep their own narrower error enums for
/// their own internal code paths and convert into this at the boundary.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct StationError {
    /// Coarse classification, used for retry/HTTP-status decisions.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Optional remediation hint surfaced to API callers (spec §7).
    pub remediation: Option<String>,
}

impl StationError {
    /// Construct a new error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            remediation: None,
        }
    }

    /// Attach a remediation hint.
    #[must_use]
    pub fn with_remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation = Some(hint.into());
        self
    }

    /// Shorthand constructors for the common kinds.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Busy, message)
    }

    pub fn budget_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BudgetExceeded, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<std::io::Error> for StationError {
    fn from(err: std::io::Error) -> Self {
        StationError::new(ErrorKind::Internal, err.to_string())
    }
}

impl From<serde_json::Error> for StationError {
    fn from(err: serde_json::Error) -> Self {
        StationError::new(ErrorKind::Internal, format!("serialization error: {err}"))
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, StationError>;
