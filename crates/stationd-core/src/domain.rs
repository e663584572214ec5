//! Domain entities (spec §3).
//!
//! These are plain serializable structs; none of them know how to persist
//! or mutate themselves — that is `stationd-store`'s and the engine crates'
//! job. Keeping them inert here is what lets every other crate share one
//! definition of "what a workstation is" without creating dependency
//! cycles.

use crate::fingerprint::Fingerprint;
use crate::ids::{IdlePolicyId, OperationId, ProjectId, VolumeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// T-shirt size, or an explicit provider instance type string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Size {
    S,
    M,
    L,
    Xl,
    Explicit(String),
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::S => write!(f, "S"),
            Size::M => write!(f, "M"),
            Size::L => write!(f, "L"),
            Size::Xl => write!(f, "XL"),
            Size::Explicit(t) => write!(f, "{t}"),
        }
    }
}

/// Billing/availability model (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    OnDemand,
    Spot,
}

/// The authoritative per-workstation state (spec §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkstationState {
    Creating,
    Running,
    Stopping,
    Stopped,
    Hibernating,
    Hibernated,
    Resuming,
    Resizing,
    Deleting,
    Deleted,
    Error,
}

impl fmt::Display for WorkstationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A snapshot of the most recent metrics sample attached to a workstation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub cpu_percent: f64,
    pub network_bytes_per_sec: f64,
    pub interactive_sessions: u32,
    pub last_user_activity: Option<DateTime<Utc>>,
    pub sampled_at: DateTime<Utc>,
}

/// One application of a template to a workstation (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerRecord {
    pub template_name: String,
    pub template_version: semver::Version,
    pub package_manager: String,
    pub applied_at: DateTime<Utc>,
    /// Provider-side rollback checkpoint handle. `None` once invalidated
    /// (spec §3 invariant 6 / DESIGN NOTES §9 "checkpoint handle lifecycle").
    pub checkpoint_handle: Option<String>,
    pub packages_installed: u32,
    pub services_configured: u32,
    pub users_created: u32,
    pub warnings: Vec<String>,
}

/// A provisioned, named cloud compute instance (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workstation {
    /// Owner-chosen, unique-per-account name. This *is* the primary key;
    /// there is no separate generated [`crate::ids`] type for it.
    pub name: String,
    /// Opaque provider-assigned id, set once `launch` reaches the cloud.
    pub provider_id: Option<String>,
    pub project: Option<ProjectId>,
    pub template_name: Option<String>,
    pub template_version: Option<semver::Version>,
    pub size: Size,
    pub lifecycle_kind: LifecycleKind,
    pub hibernation_capable: bool,
    pub state: WorkstationState,
    pub public_address: Option<String>,
    pub private_address: Option<String>,
    pub attached_volumes: BTreeSet<VolumeId>,
    pub layers: Vec<LayerRecord>,
    pub idle_policy: Option<IdlePolicyId>,
    pub launched_at: DateTime<Utc>,
    pub last_state_change: DateTime<Utc>,
    pub accrued_cost: f64,
    pub last_metric: Option<MetricSnapshot>,
    /// Monotonic version counter for optimistic concurrency (spec §4.A).
    pub version: u64,
}

impl Workstation {
    pub fn new(name: impl Into<String>, size: Size, lifecycle_kind: LifecycleKind) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            provider_id: None,
            project: None,
            template_name: None,
            template_version: None,
            size,
            lifecycle_kind,
            hibernation_capable: false,
            state: WorkstationState::Creating,
            public_address: None,
            private_address: None,
            attached_volumes: BTreeSet::new(),
            layers: Vec::new(),
            idle_policy: None,
            launched_at: now,
            last_state_change: now,
            accrued_cost: 0.0,
            last_metric: None,
            version: 0,
        }
    }
}

/// Package-manager-scoped package declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub manager: PackageManager,
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    System,
    Apt,
    Dnf,
    Pip,
    Conda,
    Spack,
    R,
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Package-manager ordering used by the template diff/apply engine
/// (spec §4.G: "system -> language-specific -> source-built").
pub const PACKAGE_MANAGER_ORDER: &[PackageManager] = &[
    PackageManager::System,
    PackageManager::Apt,
    PackageManager::Dnf,
    PackageManager::Pip,
    PackageManager::Conda,
    PackageManager::Spack,
    PackageManager::R,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    pub name: String,
    pub groups: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub command: String,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Integer,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParameterType,
    pub default: Option<serde_json::Value>,
    /// Allowed values (when non-empty, the parameter is constrained to this set).
    #[serde(default)]
    pub allowed_values: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseImageSelector {
    pub os_family: String,
    pub os_version: String,
    pub arch: String,
}

/// A declarative recipe for a workstation (spec §3, §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub version: semver::Version,
    pub description: String,
    pub base_image: BaseImageSelector,
    pub packages: Vec<PackageSpec>,
    pub users: Vec<UserSpec>,
    pub services: Vec<ServiceSpec>,
    pub open_ports: BTreeSet<u16>,
    pub parameters: Vec<ParameterSpec>,
}

/// Where a [`Template`] came from, used to implement resolver precedence
/// (spec §3: local overrides external; highest semver wins within an
/// origin when `latest` is requested).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TemplateOrigin {
    /// Higher precedence: sorts first.
    Local,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub total: Option<f64>,
    pub per_period: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub owner: String,
    pub budget: Option<Budget>,
    pub spent: f64,
    pub members: Vec<(String, MemberRole)>,
    pub status: ProjectStatus,
    pub version: u64,
}

impl Project {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            id: ProjectId::new(),
            name: name.into(),
            owner: owner.clone(),
            budget: None,
            spent: 0.0,
            members: vec![(owner, MemberRole::Owner)],
            status: ProjectStatus::Active,
            version: 0,
        }
    }

    /// `(budget - spent)`, or `None` when the project has no hard budget
    /// ("unlimited" per spec §4.D).
    pub fn remaining(&self) -> Option<f64> {
        self.budget
            .as_ref()
            .and_then(|b| b.total)
            .map(|total| total - self.spent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeKind {
    FileShare,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub kind: VolumeKind,
    pub provider_id: Option<String>,
    pub size_gb: u64,
    pub performance_tier: Option<String>,
    pub attachment: Option<String>,
    pub cost_rate_per_hour: f64,
    pub version: u64,
}

/// Taxonomy of long-running operations (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Launch,
    Start,
    Stop,
    Hibernate,
    Resume,
    Resize,
    Delete,
    ApplyTemplate,
    Rollback,
    CreateVolume,
    AttachVolume,
    DetachVolume,
    DeleteVolume,
    SnapshotTemplate,
    Exec,
}

impl OperationKind {
    /// String form used inside a [`Fingerprint`] and in journal entries.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Launch => "launch",
            OperationKind::Start => "start",
            OperationKind::Stop => "stop",
            OperationKind::Hibernate => "hibernate",
            OperationKind::Resume => "resume",
            OperationKind::Resize => "resize",
            OperationKind::Delete => "delete",
            OperationKind::ApplyTemplate => "apply-template",
            OperationKind::Rollback => "rollback",
            OperationKind::CreateVolume => "create-volume",
            OperationKind::AttachVolume => "attach-volume",
            OperationKind::DetachVolume => "detach-volume",
            OperationKind::DeleteVolume => "delete-volume",
            OperationKind::SnapshotTemplate => "snapshot-template",
            OperationKind::Exec => "exec",
        }
    }

    /// Whether this kind mutates its target and therefore must be
    /// per-target serialized (spec §4.E "Concurrency model"). `exec` is
    /// mutating unless the caller marks it read-only, which is a property
    /// of the request rather than the kind, so it is handled at admission
    /// time rather than here.
    pub fn mutates_target(self) -> bool {
        !matches!(self, OperationKind::Exec)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Succeeded | OperationState::Failed | OperationState::Canceled
        )
    }
}

/// One entry in an operation's progress stream (spec §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: String,
    pub message: String,
    /// `None` means indeterminate progress.
    pub percent: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            message: message.into(),
            percent: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_percent(mut self, percent: f32) -> Self {
        self.percent = Some(percent);
        self
    }
}

/// A long-running, durable unit of work (spec §3, §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub fingerprint: Fingerprint,
    pub submitter: String,
    /// Workstation name, project id, or volume id, depending on `kind`.
    pub target: String,
    pub params: serde_json::Value,
    pub state: OperationState,
    pub progress: Vec<ProgressEvent>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<crate::error::ErrorKind>,
    pub error_message: Option<String>,
    /// Number of execution attempts made so far (spec §4.E retry policy).
    /// `1` once the operation has started running for the first time.
    pub attempts: u32,
}

impl Operation {
    pub fn new(
        kind: OperationKind,
        target: impl Into<String>,
        params: serde_json::Value,
        submitter: impl Into<String>,
    ) -> Self {
        let target = target.into();
        let fingerprint = Fingerprint::compute(kind.as_str(), &target, &params);
        Self {
            id: OperationId::new(),
            kind,
            fingerprint,
            submitter: submitter.into(),
            target,
            params,
            state: OperationState::Queued,
            progress: Vec::new(),
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            error_message: None,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleAction {
    Stop,
    Hibernate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleThresholds {
    pub cpu_percent: f64,
    pub network_bytes_per_sec: f64,
    pub interactive_sessions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdlePolicy {
    pub id: IdlePolicyId,
    pub name: String,
    pub thresholds: IdleThresholds,
    pub evaluation_window_secs: i64,
    pub action: IdleAction,
    pub cool_down_secs: i64,
}

/// One entry in the idle engine's diagnostic ring buffer (spec §4.H.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleDecision {
    pub workstation: String,
    pub policy_id: IdlePolicyId,
    pub decided_at: DateTime<Utc>,
    pub action_taken: Option<IdleAction>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_fingerprint_is_stable_for_same_inputs() {
        let a = Operation::new(OperationKind::Stop, "w1", serde_json::json!({}), "cli");
        let b = Operation::new(OperationKind::Stop, "w1", serde_json::json!({}), "cli");
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn project_remaining_is_none_when_unbudgeted() {
        let p = Project::new("proj", "alice");
        assert_eq!(p.remaining(), None);
    }

    #[test]
    fn project_remaining_accounts_for_spend() {
        let mut p = Project::new("proj", "alice");
        p.budget = Some(Budget { total: Some(10.0), per_period: None });
        p.spent = 9.8;
        assert!((p.remaining().unwrap() - 0.2).abs() < 1e-9);
    }
}
