//! Drives the workstation state machine and volume lifecycle by executing
//! scheduler operations against a [`CloudProvider`] (spec §4.F).

use crate::state_machine::legal_transition;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use stationd_core::domain::{LifecycleKind, OperationKind, Size, Volume, VolumeKind, Workstation, WorkstationState};
use stationd_core::ids::ProjectId;
use stationd_core::{ErrorKind, Result, StationError};
use stationd_provider::{CloudProvider, ExecRequest, ImageSelector, LaunchSpec, VolumeSpec};
use stationd_scheduler::{ExecutionHandle, OperationExecutor};
use stationd_store::{StateDocument, Store};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct LaunchParams {
    size: Size,
    #[serde(default)]
    lifecycle_kind: LifecycleKind,
    project: Option<ProjectId>,
    os_family: String,
    os_version: String,
    #[serde(default = "default_arch")]
    arch: String,
    #[serde(default)]
    idle_policy: Option<stationd_core::ids::IdlePolicyId>,
}

fn default_arch() -> String {
    "x86_64".to_string()
}

impl Default for LifecycleKind {
    fn default() -> Self {
        LifecycleKind::OnDemand
    }
}

#[derive(Debug, Deserialize)]
struct ResizeParams {
    size: Size,
}

#[derive(Debug, Deserialize)]
struct ExecParams {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    read_only: bool,
}

#[derive(Debug, Deserialize)]
struct CreateVolumeParams {
    kind: VolumeKind,
    size_gb: u64,
    performance_tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VolumeAttachParams {
    volume_id: stationd_core::ids::VolumeId,
}

pub struct LifecycleExecutor {
    store: Arc<Store>,
    provider: Arc<dyn CloudProvider>,
}

impl LifecycleExecutor {
    pub fn new(store: Arc<Store>, provider: Arc<dyn CloudProvider>) -> Self {
        Self { store, provider }
    }

    async fn launch(&self, target: &str, params: serde_json::Value, handle: &ExecutionHandle) -> Result<()> {
        let params: LaunchParams = serde_json::from_value(params)
            .map_err(|err| StationError::validation(format!("invalid launch params: {err}")))?;

        if self.store.get_workstation(&target.to_string()).is_ok() {
            return Err(StationError::conflict(format!("workstation {target} already exists")));
        }

        let mut workstation = Workstation::new(target, params.size.clone(), params.lifecycle_kind);
        workstation.project = params.project;
        workstation.idle_policy = params.idle_policy;
        let capabilities = self.provider.capabilities().await?;
        workstation.hibernation_capable = capabilities.hibernation;
        self.store.upsert_workstation(workstation)?;

        handle.emit_message("resolving-image", "resolving base image")?;
        let image = self
            .provider
            .resolve_image(&ImageSelector {
                os_family: params.os_family,
                os_version: params.os_version,
                arch: params.arch,
            })
            .await?;

        if handle.is_canceled() {
            return Err(StationError::new(ErrorKind::Canceled, "launch canceled before provisioning"));
        }

        handle.emit_message("provisioning", format!("launching on image {}", image.label))?;
        let launched = self
            .provider
            .launch(
                &LaunchSpec {
                    name: target.to_string(),
                    image_id: image.image_id,
                    size: params.size,
                    open_ports: Default::default(),
                },
                handle.cancellation(),
            )
            .await?;

        let target_key = target.to_string();
        let provider_id = launched.provider_id;
        let public_address = launched.public_address;
        let private_address = launched.private_address;
        handle.stage_final_effect(move |state: &mut StateDocument| {
            let workstation = state
                .workstations
                .get_mut(&target_key)
                .ok_or_else(|| StationError::internal(format!("workstation {target_key} vanished mid-launch")))?;
            workstation.provider_id = Some(provider_id);
            workstation.public_address = public_address;
            workstation.private_address = private_address;
            workstation.state = WorkstationState::Running;
            workstation.last_state_change = Utc::now();
            workstation.version += 1;
            Ok(())
        });

        handle.emit_message("ready", "workstation is running")?;
        Ok(())
    }

    async fn transition(&self, target: &str, kind: OperationKind, params: serde_json::Value, handle: &ExecutionHandle) -> Result<()> {
        let workstation = self.store.get_workstation(&target.to_string())?;
        let (transitional, terminal) = legal_transition(workstation.state, kind)?;

        if kind == OperationKind::Hibernate && !workstation.hibernation_capable {
            return Err(StationError::new(
                ErrorKind::Conflict,
                format!("workstation {target} does not support hibernation; use stop instead"),
            ));
        }

        let provider_id = workstation
            .provider_id
            .clone()
            .ok_or_else(|| StationError::internal(format!("workstation {target} has no provider id")))?;

        let mut updated = workstation;
        updated.state = transitional;
        updated.last_state_change = Utc::now();
        self.store.upsert_workstation(updated)?;
        handle.emit_message(transitional.to_string(), format!("{kind} in progress"))?;

        let provider_result = match kind {
            OperationKind::Start => self.provider.start(&provider_id, handle.cancellation()).await,
            OperationKind::Resume => self.provider.resume(&provider_id, handle.cancellation()).await,
            OperationKind::Stop => self.provider.stop(&provider_id, handle.cancellation()).await,
            OperationKind::Hibernate => self.provider.hibernate(&provider_id, handle.cancellation()).await,
            OperationKind::Delete => self.provider.delete(&provider_id, handle.cancellation()).await,
            OperationKind::Resize => {
                let resize: ResizeParams = serde_json::from_value(params)
                    .map_err(|err| StationError::validation(format!("invalid resize params: {err}")))?;
                self.provider.resize(&provider_id, &resize.size, handle.cancellation()).await
            }
            _ => unreachable!("transition() only called for state-machine kinds"),
        };

        if let Err(err) = provider_result {
            let mut failed = self.store.get_workstation(&target.to_string())?;
            failed.state = WorkstationState::Error;
            failed.last_state_change = Utc::now();
            let _ = self.store.upsert_workstation(failed);
            return Err(err);
        }

        let resized_size = if kind == OperationKind::Resize {
            self.provider.describe(&provider_id).await.ok().map(|described| described.size)
        } else {
            None
        };
        let target_key = target.to_string();
        handle.stage_final_effect(move |state: &mut StateDocument| {
            let finished = state
                .workstations
                .get_mut(&target_key)
                .ok_or_else(|| StationError::internal(format!("workstation {target_key} vanished mid-transition")))?;
            finished.state = terminal;
            finished.last_state_change = Utc::now();
            if let Some(size) = resized_size {
                finished.size = size;
            }
            finished.version += 1;
            Ok(())
        });
        handle.emit_message(terminal.to_string(), format!("{kind} complete"))?;
        Ok(())
    }

    async fn exec(&self, target: &str, params: serde_json::Value, handle: &ExecutionHandle) -> Result<()> {
        let params: ExecParams = serde_json::from_value(params)
            .map_err(|err| StationError::validation(format!("invalid exec params: {err}")))?;
        let workstation = self.store.get_workstation(&target.to_string())?;
        let provider_id = workstation
            .provider_id
            .ok_or_else(|| StationError::internal(format!("workstation {target} has no provider id")))?;

        let result = self
            .provider
            .exec(
                &provider_id,
                &ExecRequest {
                    command: params.command,
                    args: params.args,
                    read_only: params.read_only,
                },
                handle.cancellation(),
            )
            .await?;
        handle.emit_message("exec", format!("exit code {}", result.exit_code))?;
        if result.exit_code != 0 {
            return Err(StationError::new(
                ErrorKind::CloudPermanent,
                format!("command exited with status {}: {}", result.exit_code, result.stderr),
            ));
        }
        Ok(())
    }

    async fn create_volume(&self, target: &str, params: serde_json::Value, handle: &ExecutionHandle) -> Result<()> {
        let params: CreateVolumeParams = serde_json::from_value(params)
            .map_err(|err| StationError::validation(format!("invalid create-volume params: {err}")))?;
        let handle_result = self
            .provider
            .create_volume(
                &VolumeSpec {
                    kind: params.kind,
                    size_gb: params.size_gb,
                    performance_tier: params.performance_tier.clone(),
                },
                handle.cancellation(),
            )
            .await?;

        let volume_id: stationd_core::ids::VolumeId = target
            .parse()
            .map_err(|_| StationError::validation(format!("invalid volume id {target}")))?;
        let volume = Volume {
            id: volume_id,
            kind: params.kind,
            provider_id: Some(handle_result.provider_id),
            size_gb: params.size_gb,
            performance_tier: params.performance_tier,
            attachment: None,
            cost_rate_per_hour: 0.0,
            version: 0,
        };
        handle.stage_final_effect(move |state: &mut StateDocument| {
            state.volumes.insert(volume_id, volume);
            Ok(())
        });
        handle.emit_message("created", "volume created")?;
        Ok(())
    }

    async fn delete_volume(&self, target: &str, handle: &ExecutionHandle) -> Result<()> {
        let volume_id: stationd_core::ids::VolumeId = target
            .parse()
            .map_err(|_| StationError::validation(format!("invalid volume id {target}")))?;
        let volume = self.store.get_volume(&volume_id)?;
        if let Some(provider_id) = &volume.provider_id {
            self.provider.delete_volume(provider_id, handle.cancellation()).await?;
        }
        let expected_version = volume.version;
        handle.stage_final_effect(move |state: &mut StateDocument| {
            match state.volumes.get(&volume_id) {
                Some(existing) if existing.version == expected_version => {
                    state.volumes.remove(&volume_id);
                    Ok(())
                }
                Some(existing) => Err(StationError::conflict(format!(
                    "volume {volume_id} version conflict: expected {expected_version}, found {}",
                    existing.version
                ))),
                None => Err(StationError::not_found(format!("volume {volume_id} not found"))),
            }
        });
        handle.emit_message("deleted", "volume deleted")?;
        Ok(())
    }

    async fn attach_or_detach(&self, target: &str, params: serde_json::Value, attach: bool, handle: &ExecutionHandle) -> Result<()> {
        let params: VolumeAttachParams = serde_json::from_value(params)
            .map_err(|err| StationError::validation(format!("invalid volume attachment params: {err}")))?;
        let workstation = self.store.get_workstation(&target.to_string())?;
        let provider_id = workstation
            .provider_id
            .clone()
            .ok_or_else(|| StationError::internal(format!("workstation {target} has no provider id")))?;
        let volume = self.store.get_volume(&params.volume_id)?;
        let volume_provider_id = volume
            .provider_id
            .clone()
            .ok_or_else(|| StationError::internal("volume has no provider id"))?;

        if attach {
            self.provider.attach_volume(&provider_id, &volume_provider_id, handle.cancellation()).await?;
        } else {
            self.provider.detach_volume(&provider_id, &volume_provider_id, handle.cancellation()).await?;
        }

        let target_key = target.to_string();
        let volume_id = params.volume_id;
        handle.stage_final_effect(move |state: &mut StateDocument| {
            let workstation = state
                .workstations
                .get_mut(&target_key)
                .ok_or_else(|| StationError::internal(format!("workstation {target_key} vanished mid-attachment")))?;
            if attach {
                workstation.attached_volumes.insert(volume_id);
            } else {
                workstation.attached_volumes.remove(&volume_id);
            }
            workstation.version += 1;

            let volume = state
                .volumes
                .get_mut(&volume_id)
                .ok_or_else(|| StationError::internal(format!("volume {volume_id} vanished mid-attachment")))?;
            volume.attachment = if attach { Some(target_key.clone()) } else { None };
            volume.version += 1;
            Ok(())
        });
        handle.emit_message(if attach { "attached" } else { "detached" }, "volume attachment updated")?;
        Ok(())
    }
}

#[async_trait]
impl OperationExecutor for LifecycleExecutor {
    async fn execute(&self, operation: &stationd_core::domain::Operation, handle: &ExecutionHandle) -> Result<()> {
        match operation.kind {
            OperationKind::Launch => self.launch(&operation.target, operation.params.clone(), handle).await,
            OperationKind::Start
            | OperationKind::Resume
            | OperationKind::Stop
            | OperationKind::Hibernate
            | OperationKind::Delete
            | OperationKind::Resize => {
                self.transition(&operation.target, operation.kind, operation.params.clone(), handle).await
            }
            OperationKind::Exec => self.exec(&operation.target, operation.params.clone(), handle).await,
            OperationKind::CreateVolume => self.create_volume(&operation.target, operation.params.clone(), handle).await,
            OperationKind::DeleteVolume => self.delete_volume(&operation.target, handle).await,
            OperationKind::AttachVolume => self.attach_or_detach(&operation.target, operation.params.clone(), true, handle).await,
            OperationKind::DetachVolume => self.attach_or_detach(&operation.target, operation.params.clone(), false, handle).await,
            OperationKind::ApplyTemplate | OperationKind::Rollback | OperationKind::SnapshotTemplate => Err(
                StationError::internal(format!("{} is not handled by the lifecycle executor", operation.kind)),
            ),
        }
    }
}
