//! Internal failure modes of the template engine, collapsed into
//! [`stationd_core::StationError`] at the crate boundary.

use stationd_core::{ErrorKind, StationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template {name} not found (version {version})")]
    NotFound { name: String, version: String },

    #[error("template {name} version {version} is declared by both local and external repositories and neither takes precedence")]
    Ambiguous { name: String, version: String },

    #[error("parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("apply blocked by {0} unresolved conflict(s); pass force to override")]
    Conflicts(usize),

    #[error("no surviving checkpoint at or before {0}")]
    NoSuchCheckpoint(String),

    #[error(transparent)]
    Provider(#[from] StationError),

    #[error(transparent)]
    Store(#[from] stationd_store::StoreError),
}

impl From<TemplateError> for StationError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound { .. } => StationError::not_found(err.to_string()),
            TemplateError::Ambiguous { .. } | TemplateError::InvalidParameter { .. } => {
                StationError::validation(err.to_string())
            }
            TemplateError::Conflicts(_) => StationError::conflict(err.to_string()),
            TemplateError::NoSuchCheckpoint(_) => StationError::new(ErrorKind::Conflict, err.to_string()),
            TemplateError::Provider(inner) => inner,
            TemplateError::Store(inner) => inner.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
