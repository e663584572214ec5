// Copyright 2026 Stationd contributors

//! Domain model, error taxonomy, and configuration shared by every `stationd`
//! crate.
//!
//! Nothing in this crate touches the network, the filesystem beyond config
//! loading, or a cloud provider — it exists so that `stationd-store`,
//! `stationd-scheduler`, `stationd-lifecycle`, `stationd-template`,
//! `stationd-ledger`, `stationd-idle`, and `stationd-api` can all agree on
//! the same entity shapes and the same error kinds without depending on one
//! another.

pub mod cancel;
pub mod config;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod ids;
pub mod transitions;

pub use cancel::CancellationToken;
pub use config::DaemonConfig;
pub use error::{ErrorKind, Result, StationError};
pub use fingerprint::Fingerprint;
pub use ids::{OperationId, ProjectId, VolumeId};
