//! Request/response DTOs for the HTTP API (spec §6).
//!
//! Response bodies are mostly the domain entities themselves
//! (`Workstation`, `Template`, `Project`, `Volume`, `Operation`, ...) since
//! `stationd` is a single local control-plane daemon, not a public API that
//! needs a versioned response shape independent of its internal model. Only
//! requests, which need fields the domain model doesn't carry (`wait`,
//! `force`, `estimated_daily_cost`, ...), get their own types here.

use serde::{Deserialize, Serialize};
use stationd_core::domain::{Budget, IdleAction, IdleThresholds, LifecycleKind, Size, VolumeKind};
use stationd_core::ids::{IdlePolicyId, ProjectId};
use std::collections::BTreeMap;

fn default_arch() -> String {
    "x86_64".to_string()
}

/// `POST /api/v1/workstations` (spec §6).
///
/// `region` and launch-time `volumes` are intentionally absent: neither
/// `Workstation` nor `LifecycleExecutor::launch` has a place to put them, so
/// accepting them here would silently do nothing. `package_manager` at
/// launch is similarly absent: which package manager a layer uses is a
/// property of the template's own package specs, not a launch-time choice.
#[derive(Debug, Deserialize)]
pub struct LaunchRequest {
    pub name: String,
    pub size: Size,
    #[serde(default)]
    pub lifecycle_kind: LifecycleKind,
    pub project: Option<ProjectId>,
    pub os_family: String,
    pub os_version: String,
    #[serde(default = "default_arch")]
    pub arch: String,
    pub idle_policy: Option<String>,
    /// Template to apply once the workstation is running. Submitted as a
    /// second, target-serialized `apply-template` operation right behind
    /// the launch (spec §4.E's per-target FIFO queue already guarantees it
    /// only starts once launch has released the target).
    pub template: Option<String>,
    pub template_version: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Estimated daily cost used for the ledger's budget precheck when
    /// `project` is set. Defaults to `hourly_rate(size) * 24` when omitted.
    pub estimated_daily_cost: Option<f64>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub wait: bool,
}

/// `POST /api/v1/workstations/{name}/resize`.
#[derive(Debug, Deserialize)]
pub struct ResizeRequest {
    pub size: Size,
    #[serde(default)]
    pub wait: bool,
}

/// `POST /api/v1/workstations/{name}/exec`.
#[derive(Debug, Deserialize)]
pub struct ExecRequestBody {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub wait: bool,
}

/// `POST /api/v1/workstations/{name}/{stop,start,hibernate,resume,delete}`.
#[derive(Debug, Default, Deserialize)]
pub struct TransitionRequest {
    #[serde(default)]
    pub wait: bool,
}

/// `POST /api/v1/workstations/{name}/apply`.
#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub template_name: String,
    pub template_version: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub wait: bool,
}

/// `POST /api/v1/workstations/{name}/diff`. Diffing is synchronous (it is a
/// read against the live workstation, not a mutation), so unlike `apply` it
/// returns a `TemplateDiff` directly rather than an operation handle.
#[derive(Debug, Deserialize)]
pub struct DiffRequest {
    pub template_name: String,
    pub template_version: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub force: bool,
}

/// `POST /api/v1/workstations/{name}/rollback`.
#[derive(Debug, Default, Deserialize)]
pub struct RollbackRequest {
    pub checkpoint: Option<String>,
    #[serde(default)]
    pub wait: bool,
}

/// `POST /api/v1/templates/snapshot`.
#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    pub workstation: String,
    pub template_name: String,
    #[serde(default)]
    pub wait: bool,
}

/// `POST /api/v1/volumes` (and its `/api/v1/storage` alias). No `name`
/// field: `Volume` is addressed by its `VolumeId`, same as the domain model.
#[derive(Debug, Deserialize)]
pub struct CreateVolumeRequest {
    pub kind: VolumeKind,
    pub size_gb: u64,
    pub performance_tier: Option<String>,
    #[serde(default)]
    pub wait: bool,
}

/// `POST /api/v1/volumes/{id}/attach` and `.../detach`.
#[derive(Debug, Deserialize)]
pub struct VolumeAttachmentRequest {
    pub workstation: String,
    #[serde(default)]
    pub wait: bool,
}

/// `POST /api/v1/projects`.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub owner: String,
    pub budget: Option<Budget>,
}

/// `POST /api/v1/projects/{id}/precheck`.
#[derive(Debug, Deserialize)]
pub struct PrecheckRequest {
    pub estimated_cost: f64,
}

#[derive(Debug, Serialize)]
pub struct PrecheckResponse {
    pub allowed: bool,
    pub remaining: Option<f64>,
}

/// `POST /api/v1/idle-policies`.
#[derive(Debug, Deserialize)]
pub struct CreateIdlePolicyRequest {
    pub name: String,
    pub thresholds: IdleThresholds,
    pub evaluation_window_secs: i64,
    pub action: IdleAction,
    pub cool_down_secs: i64,
}

impl CreateIdlePolicyRequest {
    pub fn into_policy(self) -> stationd_core::domain::IdlePolicy {
        stationd_core::domain::IdlePolicy {
            id: IdlePolicyId::new(),
            name: self.name,
            thresholds: self.thresholds,
            evaluation_window_secs: self.evaluation_window_secs,
            action: self.action,
            cool_down_secs: self.cool_down_secs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub uptime_seconds: i64,
    pub active_operations: usize,
    pub region: String,
    pub profile: String,
}
