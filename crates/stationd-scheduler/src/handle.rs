//! What an [`crate::executor::OperationExecutor`] is handed for one run of
//! one operation: its cancellation token and a way to emit progress that
//! is both persisted and broadcast to live subscribers.

use stationd_core::domain::ProgressEvent;
use stationd_core::ids::OperationId;
use stationd_core::{CancellationToken, Result};
use stationd_store::{StateDocument, Store};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// The domain effect (workstation state, layer tail, volume mutation, ...)
/// an executor stages for the scheduler to commit atomically with the
/// operation's terminal write (spec invariant 4 / §8 property 3).
type FinalEffect = Box<dyn FnOnce(&mut StateDocument) -> Result<()> + Send>;

pub struct ExecutionHandle {
    pub(crate) operation_id: OperationId,
    pub(crate) cancel: CancellationToken,
    pub(crate) progress_tx: broadcast::Sender<ProgressEvent>,
    pub(crate) store: Arc<Store>,
    pub(crate) final_effect: Mutex<Option<FinalEffect>>,
}

impl ExecutionHandle {
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Record a progress event: append it to the durable operation record
    /// and broadcast it to anyone subscribed via
    /// [`crate::Scheduler::subscribe`]. Broadcast is best-effort — a lagged
    /// or absent subscriber never blocks or fails the operation.
    pub fn emit(&self, event: ProgressEvent) -> Result<()> {
        let id = self.operation_id;
        let event_clone = event.clone();
        self.store.transact(format!("operation {id} progress"), move |state| {
            if let Some(op) = state.operations.get_mut(&id) {
                op.progress.push(event_clone);
            }
            Ok(())
        })?;
        let _ = self.progress_tx.send(event);
        Ok(())
    }

    pub fn emit_message(&self, phase: impl Into<String>, message: impl Into<String>) -> Result<()> {
        self.emit(ProgressEvent::new(phase, message))
    }

    /// Stage the domain mutation that makes this operation's success
    /// durable (the workstation/layer/volume write a successful executor
    /// would otherwise commit on its own). The scheduler commits it in the
    /// same `Store` transaction as the operation's terminal write, so a
    /// crash can never observe one without the other (spec invariant 4 /
    /// §8 property 3). Only the last staged effect survives; call this
    /// once, right before returning `Ok(())`.
    pub fn stage_final_effect<F>(&self, effect: F)
    where
        F: FnOnce(&mut StateDocument) -> Result<()> + Send + 'static,
    {
        *self.final_effect.lock().expect("handle mutex poisoned") = Some(Box::new(effect));
    }

    pub(crate) fn take_final_effect(&self) -> Option<FinalEffect> {
        self.final_effect.lock().expect("handle mutex poisoned").take()
    }
}
