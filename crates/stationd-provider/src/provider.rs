//! The `CloudProvider` port (spec §4.B).
//!
//! This is the one seam in the daemon that talks to an actual cloud
//! backend. The real implementation is explicitly out of scope (spec §1
//! Non-goals) — this crate only defines the narrow verb set the rest of
//! the daemon calls through, plus an in-process mock so everything above
//! this trait can be built and tested without one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stationd_core::domain::{PackageManager, Size, VolumeKind};
use stationd_core::{CancellationToken, Result};
use std::collections::BTreeSet;

/// Capabilities a given provider/account/region combination actually
/// supports, probed once at daemon startup (SPEC_FULL.md §3 "capability
/// probing").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub hibernation: bool,
    pub resize_in_place: bool,
    pub volume_attach: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSelector {
    pub os_family: String,
    pub os_version: String,
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedImage {
    pub image_id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub name: String,
    pub image_id: String,
    pub size: Size,
    pub open_ports: BTreeSet<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchResult {
    pub provider_id: String,
    pub public_address: Option<String>,
    pub private_address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Hibernating,
    Hibernated,
    Terminated,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeResult {
    pub provider_id: String,
    pub state: ProviderState,
    pub public_address: Option<String>,
    pub private_address: Option<String>,
    pub size: Size,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    pub args: Vec<String>,
    /// Whether this call mutates the target, used by callers to decide
    /// whether it needs per-target serialization (spec §4.E).
    pub read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub kind: VolumeKind,
    pub size_gb: u64,
    pub performance_tier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeHandle {
    pub provider_id: String,
}

/// The set of infrastructure verbs the daemon needs from a cloud backend.
/// Every method takes a [`CancellationToken`] so a long-running call can be
/// aborted cooperatively between internal steps (spec §4.E).
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn resolve_image(&self, selector: &ImageSelector) -> Result<ResolvedImage>;

    async fn launch(&self, spec: &LaunchSpec, cancel: &CancellationToken) -> Result<LaunchResult>;

    async fn start(&self, provider_id: &str, cancel: &CancellationToken) -> Result<()>;
    async fn stop(&self, provider_id: &str, cancel: &CancellationToken) -> Result<()>;
    async fn hibernate(&self, provider_id: &str, cancel: &CancellationToken) -> Result<()>;
    async fn resume(&self, provider_id: &str, cancel: &CancellationToken) -> Result<()>;
    async fn delete(&self, provider_id: &str, cancel: &CancellationToken) -> Result<()>;

    async fn resize(&self, provider_id: &str, size: &Size, cancel: &CancellationToken) -> Result<()>;

    async fn describe(&self, provider_id: &str) -> Result<DescribeResult>;

    async fn exec(&self, provider_id: &str, request: &ExecRequest, cancel: &CancellationToken) -> Result<ExecResult>;

    async fn create_volume(&self, spec: &VolumeSpec, cancel: &CancellationToken) -> Result<VolumeHandle>;
    async fn delete_volume(&self, volume_provider_id: &str, cancel: &CancellationToken) -> Result<()>;
    async fn attach_volume(&self, provider_id: &str, volume_provider_id: &str, cancel: &CancellationToken) -> Result<()>;
    async fn detach_volume(&self, provider_id: &str, volume_provider_id: &str, cancel: &CancellationToken) -> Result<()>;

    /// Create a rollback point (spec §4.G "Apply" step 1): "implementation's
    /// choice: image snapshot or filesystem-level marker". Returns an opaque
    /// handle the template engine persists before mutating anything.
    async fn create_checkpoint(&self, provider_id: &str, cancel: &CancellationToken) -> Result<String>;

    /// Restore a workstation to a previously created checkpoint (spec §4.G
    /// "Rollback").
    async fn restore_checkpoint(&self, provider_id: &str, checkpoint: &str, cancel: &CancellationToken) -> Result<()>;

    /// Probed once at startup and cached (SPEC_FULL.md §3).
    async fn capabilities(&self) -> Result<ProviderCapabilities>;

    /// Package-manager invocations the template engine drives `exec`
    /// through are manager-specific; this reports which managers this
    /// provider's base images actually carry, so `stationd-template` can
    /// skip phases that would otherwise fail outright.
    async fn supported_package_managers(&self) -> Result<BTreeSet<PackageManager>>;
}
