//! Store-internal failure modes. These convert into
//! [`stationd_core::StationError`] at the boundary via the `From` impl
//! below, the same pattern every other crate in the workspace follows.

use stationd_core::{ErrorKind, StationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Optimistic-concurrency failure: the caller's `expected_version` did
    /// not match the entity's current version.
    #[error("version conflict on {entity}: expected {expected}, found {actual}")]
    Conflict {
        entity: String,
        expected: u64,
        actual: u64,
    },

    #[error("durable state is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    /// A caller outside this crate failed inside a `transact` closure with
    /// its own `StationError`. Carries the original kind/message through
    /// so `transact_external` can hand it back unchanged.
    #[error("{message}")]
    External { kind: ErrorKind, message: String },
}

impl From<StoreError> for StationError {
    fn from(err: StoreError) -> Self {
        if let StoreError::External { kind, message } = err {
            return StationError::new(kind, message);
        }
        let kind = match &err {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists(_) => ErrorKind::Conflict,
            StoreError::Conflict { .. } => ErrorKind::Conflict,
            StoreError::Corrupt(_) => ErrorKind::Internal,
            StoreError::Io(_) => ErrorKind::Internal,
            StoreError::Serde(_) => ErrorKind::Internal,
            StoreError::External { .. } => unreachable!(),
        };
        StationError::new(kind, err.to_string())
    }
}

impl From<StationError> for StoreError {
    fn from(err: StationError) -> Self {
        StoreError::External {
            kind: err.kind,
            message: err.message,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
