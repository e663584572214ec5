//! The seam between the scheduler and the crates that actually know how to
//! run an operation (`stationd-lifecycle`, `stationd-template`). Keeping
//! this as a trait rather than a direct dependency means the scheduler
//! only knows how to run *something* with progress/cancellation, not what
//! a `launch` or an `apply-template` actually does.

use crate::handle::ExecutionHandle;
use async_trait::async_trait;
use stationd_core::domain::Operation;
use stationd_core::ids::ProjectId;
use stationd_core::Result;

/// Runs one [`Operation`] to completion, reporting progress and observing
/// cancellation through `handle`. A `Ok(())` return marks the operation
/// succeeded; an `Err` marks it failed (and, if the error kind is
/// retryable, eligible for another attempt per the configured retry
/// policy).
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(&self, operation: &Operation, handle: &ExecutionHandle) -> Result<()>;
}

/// The single budget-enforcement seam (spec §4.D), called during
/// admission for operations that carry a project and an estimated cost.
/// Implemented by `stationd-ledger::Ledger` in the wired daemon; scheduler
/// tests can supply a gate that always allows.
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    async fn precheck(&self, project: &ProjectId, estimated_cost: f64) -> Result<()>;
}

/// An [`AdmissionGate`] that never rejects, for tests and for operations
/// that never call into it.
pub struct AlwaysAdmit;

#[async_trait]
impl AdmissionGate for AlwaysAdmit {
    async fn precheck(&self, _project: &ProjectId, _estimated_cost: f64) -> Result<()> {
        Ok(())
    }
}
