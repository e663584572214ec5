//! In-process mock implementations of [`CloudProvider`] and
//! [`MetricsSource`] (SPEC_FULL.md §2 "Test tooling"). Used both by the
//! daemon when no real cloud backend is configured and by the rest of the
//! workspace's test suites.

use crate::metrics::MetricsSource;
use crate::provider::{
    CloudProvider, DescribeResult, ExecRequest, ExecResult, ImageSelector, LaunchResult, LaunchSpec,
    ProviderCapabilities, ProviderState, ResolvedImage, VolumeHandle, VolumeSpec,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use stationd_core::domain::{MetricSnapshot, PackageManager, Size};
use stationd_core::{CancellationToken, ErrorKind, Result, StationError};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
struct MockInstance {
    state: ProviderState,
    size: Size,
    public_address: Option<String>,
    private_address: Option<String>,
}

/// A fully in-memory `CloudProvider`. Launch/resize/stop/etc. mutate an
/// internal table keyed by a generated provider id; nothing here ever
/// touches the network.
#[derive(Default)]
pub struct MockCloudProvider {
    instances: Mutex<HashMap<String, MockInstance>>,
    volumes: Mutex<HashMap<String, ()>>,
    checkpoints: Mutex<HashMap<String, MockInstance>>,
    capabilities: ProviderCapabilities,
}

impl MockCloudProvider {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            volumes: Mutex::new(HashMap::new()),
            checkpoints: Mutex::new(HashMap::new()),
            capabilities: ProviderCapabilities {
                hibernation: true,
                resize_in_place: true,
                volume_attach: true,
            },
        }
    }

    pub fn with_capabilities(capabilities: ProviderCapabilities) -> Self {
        Self {
            capabilities,
            ..Self::new()
        }
    }

    fn require(&self, provider_id: &str) -> Result<MockInstance> {
        self.instances
            .lock()
            .get(provider_id)
            .cloned()
            .ok_or_else(|| StationError::not_found(format!("mock instance {provider_id}")))
    }
}

#[async_trait]
impl CloudProvider for MockCloudProvider {
    async fn resolve_image(&self, selector: &ImageSelector) -> Result<ResolvedImage> {
        Ok(ResolvedImage {
            image_id: format!("mock-{}-{}-{}", selector.os_family, selector.os_version, selector.arch),
            label: format!("{} {} ({})", selector.os_family, selector.os_version, selector.arch),
        })
    }

    async fn launch(&self, spec: &LaunchSpec, _cancel: &CancellationToken) -> Result<LaunchResult> {
        let provider_id = format!("mock-i-{}", uuid::Uuid::new_v4());
        let public_address = Some(format!("{provider_id}.mock.invalid"));
        let private_address = Some(format!("10.0.0.{}", rand::random::<u8>()));
        self.instances.lock().insert(
            provider_id.clone(),
            MockInstance {
                state: ProviderState::Running,
                size: spec.size.clone(),
                public_address: public_address.clone(),
                private_address: private_address.clone(),
            },
        );
        Ok(LaunchResult {
            provider_id,
            public_address,
            private_address,
        })
    }

    async fn start(&self, provider_id: &str, _cancel: &CancellationToken) -> Result<()> {
        let mut instances = self.instances.lock();
        let instance = instances
            .get_mut(provider_id)
            .ok_or_else(|| StationError::not_found(format!("mock instance {provider_id}")))?;
        instance.state = ProviderState::Running;
        Ok(())
    }

    async fn stop(&self, provider_id: &str, _cancel: &CancellationToken) -> Result<()> {
        let mut instances = self.instances.lock();
        let instance = instances
            .get_mut(provider_id)
            .ok_or_else(|| StationError::not_found(format!("mock instance {provider_id}")))?;
        instance.state = ProviderState::Stopped;
        Ok(())
    }

    async fn hibernate(&self, provider_id: &str, _cancel: &CancellationToken) -> Result<()> {
        if !self.capabilities.hibernation {
            return Err(StationError::new(ErrorKind::CloudPermanent, "hibernation not supported"));
        }
        let mut instances = self.instances.lock();
        let instance = instances
            .get_mut(provider_id)
            .ok_or_else(|| StationError::not_found(format!("mock instance {provider_id}")))?;
        instance.state = ProviderState::Hibernated;
        Ok(())
    }

    async fn resume(&self, provider_id: &str, _cancel: &CancellationToken) -> Result<()> {
        let mut instances = self.instances.lock();
        let instance = instances
            .get_mut(provider_id)
            .ok_or_else(|| StationError::not_found(format!("mock instance {provider_id}")))?;
        instance.state = ProviderState::Running;
        Ok(())
    }

    async fn delete(&self, provider_id: &str, _cancel: &CancellationToken) -> Result<()> {
        let mut instances = self.instances.lock();
        instances
            .get_mut(provider_id)
            .ok_or_else(|| StationError::not_found(format!("mock instance {provider_id}")))?
            .state = ProviderState::Terminated;
        Ok(())
    }

    async fn resize(&self, provider_id: &str, size: &Size, _cancel: &CancellationToken) -> Result<()> {
        let mut instances = self.instances.lock();
        let instance = instances
            .get_mut(provider_id)
            .ok_or_else(|| StationError::not_found(format!("mock instance {provider_id}")))?;
        instance.size = size.clone();
        Ok(())
    }

    async fn describe(&self, provider_id: &str) -> Result<DescribeResult> {
        let instance = self.require(provider_id)?;
        Ok(DescribeResult {
            provider_id: provider_id.to_string(),
            state: instance.state,
            public_address: instance.public_address,
            private_address: instance.private_address,
            size: instance.size,
        })
    }

    async fn exec(&self, provider_id: &str, request: &ExecRequest, _cancel: &CancellationToken) -> Result<ExecResult> {
        self.require(provider_id)?;
        Ok(ExecResult {
            exit_code: 0,
            stdout: format!("mock exec: {} {}", request.command, request.args.join(" ")),
            stderr: String::new(),
        })
    }

    async fn create_volume(&self, _spec: &VolumeSpec, _cancel: &CancellationToken) -> Result<VolumeHandle> {
        let provider_id = format!("mock-v-{}", uuid::Uuid::new_v4());
        self.volumes.lock().insert(provider_id.clone(), ());
        Ok(VolumeHandle { provider_id })
    }

    async fn delete_volume(&self, volume_provider_id: &str, _cancel: &CancellationToken) -> Result<()> {
        self.volumes
            .lock()
            .remove(volume_provider_id)
            .ok_or_else(|| StationError::not_found(format!("mock volume {volume_provider_id}")))?;
        Ok(())
    }

    async fn attach_volume(&self, provider_id: &str, volume_provider_id: &str, _cancel: &CancellationToken) -> Result<()> {
        self.require(provider_id)?;
        if !self.volumes.lock().contains_key(volume_provider_id) {
            return Err(StationError::not_found(format!("mock volume {volume_provider_id}")));
        }
        if !self.capabilities.volume_attach {
            return Err(StationError::new(ErrorKind::CloudPermanent, "volume attach not supported"));
        }
        Ok(())
    }

    async fn detach_volume(&self, provider_id: &str, volume_provider_id: &str, _cancel: &CancellationToken) -> Result<()> {
        self.require(provider_id)?;
        if !self.volumes.lock().contains_key(volume_provider_id) {
            return Err(StationError::not_found(format!("mock volume {volume_provider_id}")));
        }
        Ok(())
    }

    async fn create_checkpoint(&self, provider_id: &str, _cancel: &CancellationToken) -> Result<String> {
        let instance = self.require(provider_id)?;
        let handle = format!("mock-ckpt-{}", uuid::Uuid::new_v4());
        self.checkpoints.lock().insert(handle.clone(), instance);
        Ok(handle)
    }

    async fn restore_checkpoint(&self, provider_id: &str, checkpoint: &str, _cancel: &CancellationToken) -> Result<()> {
        let snapshot = self
            .checkpoints
            .lock()
            .get(checkpoint)
            .cloned()
            .ok_or_else(|| StationError::not_found(format!("mock checkpoint {checkpoint}")))?;
        let mut instances = self.instances.lock();
        let instance = instances
            .get_mut(provider_id)
            .ok_or_else(|| StationError::not_found(format!("mock instance {provider_id}")))?;
        *instance = snapshot;
        Ok(())
    }

    async fn capabilities(&self) -> Result<ProviderCapabilities> {
        Ok(self.capabilities)
    }

    async fn supported_package_managers(&self) -> Result<BTreeSet<PackageManager>> {
        Ok([
            PackageManager::System,
            PackageManager::Apt,
            PackageManager::Pip,
            PackageManager::Conda,
        ]
        .into_iter()
        .collect())
    }
}

/// A [`MetricsSource`] that returns a fixed, settable snapshot per
/// provider id, so idle-engine tests can deterministically drive a
/// workstation "idle" or "busy".
#[derive(Default)]
pub struct MockMetricsSource {
    snapshots: Mutex<HashMap<String, MetricSnapshot>>,
}

impl MockMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, provider_id: impl Into<String>, snapshot: MetricSnapshot) {
        self.snapshots.lock().insert(provider_id.into(), snapshot);
    }
}

#[async_trait]
impl MetricsSource for MockMetricsSource {
    async fn sample(&self, provider_id: &str) -> Result<MetricSnapshot> {
        if let Some(snapshot) = self.snapshots.lock().get(provider_id).cloned() {
            return Ok(snapshot);
        }
        Ok(MetricSnapshot {
            cpu_percent: 0.0,
            network_bytes_per_sec: 0.0,
            interactive_sessions: 0,
            last_user_activity: None,
            sampled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ImageSelector;

    #[tokio::test]
    async fn launch_then_describe_round_trips() {
        let provider = MockCloudProvider::new();
        let cancel = CancellationToken::new();
        let image = provider
            .resolve_image(&ImageSelector {
                os_family: "ubuntu".into(),
                os_version: "22.04".into(),
                arch: "x86_64".into(),
            })
            .await
            .unwrap();

        let launched = provider
            .launch(
                &LaunchSpec {
                    name: "ws1".into(),
                    image_id: image.image_id,
                    size: Size::M,
                    open_ports: BTreeSet::new(),
                },
                &cancel,
            )
            .await
            .unwrap();

        let described = provider.describe(&launched.provider_id).await.unwrap();
        assert_eq!(described.state, ProviderState::Running);
    }

    #[tokio::test]
    async fn hibernate_requires_capability() {
        let provider = MockCloudProvider::with_capabilities(ProviderCapabilities::default());
        let cancel = CancellationToken::new();
        let launched = provider
            .launch(
                &LaunchSpec {
                    name: "ws1".into(),
                    image_id: "img".into(),
                    size: Size::S,
                    open_ports: BTreeSet::new(),
                },
                &cancel,
            )
            .await
            .unwrap();
        let err = provider.hibernate(&launched.provider_id, &cancel).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::CloudPermanent);
    }

    #[tokio::test]
    async fn describe_unknown_instance_is_not_found() {
        let provider = MockCloudProvider::new();
        let err = provider.describe("nonexistent").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
