//! Dispatches scheduler operations to whichever engine owns that
//! [`OperationKind`]: the template engine for `apply-template`/`rollback`/
//! `snapshot-template`, the lifecycle engine for everything else.

use async_trait::async_trait;
use stationd_core::domain::{Operation, OperationKind};
use stationd_core::Result;
use stationd_lifecycle::LifecycleExecutor;
use stationd_scheduler::{ExecutionHandle, OperationExecutor};
use stationd_template::TemplateExecutor;

pub struct CompositeExecutor {
    lifecycle: LifecycleExecutor,
    template: TemplateExecutor,
}

impl CompositeExecutor {
    pub fn new(lifecycle: LifecycleExecutor, template: TemplateExecutor) -> Self {
        Self { lifecycle, template }
    }
}

#[async_trait]
impl OperationExecutor for CompositeExecutor {
    async fn execute(&self, operation: &Operation, handle: &ExecutionHandle) -> Result<()> {
        match operation.kind {
            OperationKind::ApplyTemplate | OperationKind::Rollback | OperationKind::SnapshotTemplate => {
                self.template.execute(operation, handle).await
            }
            _ => self.lifecycle.execute(operation, handle).await,
        }
    }
}
