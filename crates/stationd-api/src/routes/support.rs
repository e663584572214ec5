//! Small helpers shared across route handlers.

use crate::error::ApiError;
use stationd_core::domain::Operation;
use stationd_core::ids::IdlePolicyId;
use stationd_core::StationError;
use stationd_scheduler::Scheduler;
use stationd_store::Store;

/// Resolve an idle policy reference that may be either its UUID or its
/// human-chosen `name` (spec's own scenarios refer to policies by name,
/// e.g. `idle_policy: "batch"`, even though the store keys them by
/// [`IdlePolicyId`]).
pub fn resolve_idle_policy(store: &Store, reference: &str) -> Result<IdlePolicyId, ApiError> {
    if let Ok(id) = reference.parse::<IdlePolicyId>() {
        if store.get_idle_policy(&id).is_ok() {
            return Ok(id);
        }
    }
    store
        .list_idle_policies()
        .into_iter()
        .find(|policy| policy.name == reference)
        .map(|policy| policy.id)
        .ok_or_else(|| StationError::not_found(format!("idle policy {reference} not found")).into())
}

/// When `wait` is requested, block on the operation's progress stream until
/// it reaches a terminal state, then return the up-to-date record. Otherwise
/// return the operation as submitted (spec §6: every action endpoint
/// "returns an operation handle immediately" unless the caller opts into
/// `wait`).
pub async fn maybe_await(scheduler: &Scheduler, operation: Operation, wait: bool) -> Result<Operation, ApiError> {
    if !wait {
        return Ok(operation);
    }
    let (_, mut receiver) = scheduler.subscribe(&operation.id)?;
    loop {
        let current = scheduler.get(&operation.id)?;
        if current.state.is_terminal() {
            return Ok(current);
        }
        match receiver.recv().await {
            Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(scheduler.get(&operation.id)?),
        }
    }
}
