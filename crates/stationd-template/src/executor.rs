//! The [`OperationExecutor`] for the three template-engine operation kinds
//! (spec §4.G): `apply-template`, `rollback`, `snapshot-template`.

use crate::apply::run_phases;
use crate::diff::{compute_diff, probe_workstation};
use crate::error::{Result as TemplateResult, TemplateError};
use crate::resolve::{resolve, resolve_parameters};
use crate::snapshot::build_template;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use stationd_core::domain::{BaseImageSelector, LayerRecord, OperationKind, TemplateOrigin, WorkstationState};
use stationd_core::{ErrorKind, StationError};
use stationd_provider::CloudProvider;
use stationd_scheduler::{ExecutionHandle, OperationExecutor};
use stationd_store::{StateDocument, Store, StoredTemplate};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct ApplyParams {
    template_name: String,
    template_version: Option<String>,
    #[serde(default)]
    parameters: BTreeMap<String, Value>,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct RollbackParams {
    checkpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotParams {
    template_name: String,
}

pub struct TemplateExecutor {
    store: Arc<Store>,
    provider: Arc<dyn CloudProvider>,
}

impl TemplateExecutor {
    pub fn new(store: Arc<Store>, provider: Arc<dyn CloudProvider>) -> Self {
        Self { store, provider }
    }

    async fn apply(&self, target: &str, params: Value, handle: &ExecutionHandle) -> TemplateResult<()> {
        let params: ApplyParams = serde_json::from_value(params)
            .map_err(|err| TemplateError::InvalidParameter { name: "body".to_string(), reason: err.to_string() })?;
        let version = params
            .template_version
            .as_deref()
            .map(semver::Version::parse)
            .transpose()
            .map_err(|err| TemplateError::InvalidParameter { name: "template_version".to_string(), reason: err.to_string() })?;

        let workstation = self.store.get_workstation(&target.to_string())?;
        if workstation.state != WorkstationState::Running {
            return Err(TemplateError::Provider(StationError::conflict(format!(
                "workstation {target} must be running to apply a template"
            ))));
        }
        let provider_id = workstation
            .provider_id
            .clone()
            .ok_or_else(|| TemplateError::Provider(StationError::internal("workstation has no provider id")))?;

        let (template, _origin) = resolve(&self.store, &params.template_name, version.as_ref())?;
        let _resolved_parameters = resolve_parameters(&template, &params.parameters)?;

        handle.emit_message("probing", "inspecting current workstation configuration")?;
        let observed = probe_workstation(self.provider.as_ref(), &provider_id, handle.cancellation()).await?;
        let diff = compute_diff(&template, &observed, params.force);

        if diff.blocks_apply() && !params.force {
            return Err(TemplateError::Conflicts(diff.conflicts.len()));
        }

        if params.dry_run {
            handle.emit_message(
                "dry-run",
                format!(
                    "would install {} packages, create {} users, configure {} services, open {} ports",
                    diff.packages_to_install.len(),
                    diff.users_to_create.len(),
                    diff.services_to_configure.len(),
                    diff.ports_to_open.len()
                ),
            )?;
            return Ok(());
        }

        handle.emit_message("checkpoint", "creating rollback checkpoint")?;
        let checkpoint = self.provider.create_checkpoint(&provider_id, handle.cancellation()).await?;

        let phase_result = run_phases(self.provider.as_ref(), &provider_id, handle.cancellation(), &diff, |phase, message| {
            let _ = handle.emit_message(phase.to_string(), message);
        })
        .await;

        let summary = match phase_result {
            Ok(summary) => summary,
            Err(err) => {
                if !params.force {
                    handle.emit_message("rollback", "apply failed, restoring checkpoint")?;
                    let _ = self.provider.restore_checkpoint(&provider_id, &checkpoint, handle.cancellation()).await;
                }
                return Err(TemplateError::Provider(err));
            }
        };

        let manager_label = template
            .packages
            .first()
            .map(|p| p.manager.to_string())
            .unwrap_or_else(|| "none".to_string());
        let layer = LayerRecord {
            template_name: template.name.clone(),
            template_version: template.version.clone(),
            package_manager: manager_label,
            applied_at: Utc::now(),
            checkpoint_handle: Some(checkpoint),
            packages_installed: summary.packages_installed,
            services_configured: summary.services_configured,
            users_created: summary.users_created,
            warnings: summary.warnings,
        };

        let target_key = target.to_string();
        let template_name = template.name.clone();
        let template_version = template.version.clone();
        handle.stage_final_effect(move |state: &mut StateDocument| {
            let workstation = state
                .workstations
                .get_mut(&target_key)
                .ok_or_else(|| StationError::internal(format!("workstation {target_key} vanished mid-apply")))?;
            workstation.template_name = Some(template_name);
            workstation.template_version = Some(template_version);
            workstation.layers.push(layer);
            workstation.version += 1;
            Ok(())
        });
        handle.emit_message("applied", format!("template {} applied", template.name))?;
        Ok(())
    }

    async fn rollback(&self, target: &str, params: Value, handle: &ExecutionHandle) -> TemplateResult<()> {
        let params: RollbackParams = serde_json::from_value(params)
            .map_err(|err| TemplateError::InvalidParameter { name: "body".to_string(), reason: err.to_string() })?;

        let workstation = self.store.get_workstation(&target.to_string())?;
        let provider_id = workstation
            .provider_id
            .clone()
            .ok_or_else(|| TemplateError::Provider(StationError::internal("workstation has no provider id")))?;

        let index = match &params.checkpoint {
            Some(requested) => workstation
                .layers
                .iter()
                .position(|layer| layer.checkpoint_handle.as_deref() == Some(requested.as_str())),
            None => workstation
                .layers
                .iter()
                .rposition(|layer| layer.checkpoint_handle.is_some()),
        };
        let index = index.ok_or_else(|| {
            TemplateError::NoSuchCheckpoint(params.checkpoint.clone().unwrap_or_else(|| "previous".to_string()))
        })?;
        let checkpoint = workstation.layers[index]
            .checkpoint_handle
            .clone()
            .ok_or_else(|| TemplateError::NoSuchCheckpoint("previous".to_string()))?;

        handle.emit_message("restoring", "restoring checkpoint")?;
        self.provider
            .restore_checkpoint(&provider_id, &checkpoint, handle.cancellation())
            .await
            .map_err(TemplateError::Provider)?;

        let target_key = target.to_string();
        handle.stage_final_effect(move |state: &mut StateDocument| {
            let workstation = state
                .workstations
                .get_mut(&target_key)
                .ok_or_else(|| StationError::internal(format!("workstation {target_key} vanished mid-rollback")))?;
            workstation.layers.truncate(index);
            workstation.version += 1;
            Ok(())
        });
        handle.emit_message("rolled-back", "workstation restored to checkpoint")?;
        Ok(())
    }

    async fn snapshot(&self, target: &str, params: Value, handle: &ExecutionHandle) -> TemplateResult<()> {
        let params: SnapshotParams = serde_json::from_value(params)
            .map_err(|err| TemplateError::InvalidParameter { name: "body".to_string(), reason: err.to_string() })?;

        let workstation = self.store.get_workstation(&target.to_string())?;
        let provider_id = workstation
            .provider_id
            .clone()
            .ok_or_else(|| TemplateError::Provider(StationError::internal("workstation has no provider id")))?;

        handle.emit_message("probing", "inspecting workstation for snapshot")?;
        let observed = probe_workstation(self.provider.as_ref(), &provider_id, handle.cancellation()).await?;

        let base_image = self
            .store
            .list_templates()
            .into_iter()
            .find(|stored| Some(&stored.template.name) == workstation.template_name.as_ref())
            .map(|stored| stored.template.base_image)
            .unwrap_or(BaseImageSelector {
                os_family: "unknown".to_string(),
                os_version: "unknown".to_string(),
                arch: "x86_64".to_string(),
            });

        let template = build_template(params.template_name, base_image, &observed);
        handle.stage_final_effect(move |state: &mut StateDocument| {
            state.templates.retain(|t| {
                !(t.template.name == template.name && t.template.version == template.version && t.origin == TemplateOrigin::Local)
            });
            state.templates.push(StoredTemplate { template, origin: TemplateOrigin::Local });
            Ok(())
        });
        handle.emit_message("snapshot", "template captured from running workstation")?;
        Ok(())
    }
}

#[async_trait]
impl OperationExecutor for TemplateExecutor {
    async fn execute(&self, operation: &stationd_core::domain::Operation, handle: &ExecutionHandle) -> stationd_core::Result<()> {
        match operation.kind {
            OperationKind::ApplyTemplate => self.apply(&operation.target, operation.params.clone(), handle).await.map_err(Into::into),
            OperationKind::Rollback => self.rollback(&operation.target, operation.params.clone(), handle).await.map_err(Into::into),
            OperationKind::SnapshotTemplate => self.snapshot(&operation.target, operation.params.clone(), handle).await.map_err(Into::into),
            other => Err(StationError::new(ErrorKind::Internal, format!("{other} is not handled by the template executor"))),
        }
    }
}
