// Copyright 2026 Stationd contributors

//! The template engine (spec §4.G): resolve, diff, apply, snapshot, and
//! rollback, plus the [`OperationExecutor`](stationd_scheduler::OperationExecutor)
//! that drives `apply-template`/`rollback`/`snapshot-template` operations.

pub mod apply;
pub mod diff;
pub mod error;
pub mod executor;
pub mod resolve;
pub mod snapshot;

pub use diff::{compute_diff, probe_workstation, ObservedState, TemplateDiff};
pub use error::{Result, TemplateError};
pub use executor::TemplateExecutor;
pub use resolve::{resolve, resolve_parameters};
pub use snapshot::build_template;
