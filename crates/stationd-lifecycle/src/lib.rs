// Copyright 2026 Stationd contributors

//! The workstation lifecycle engine (spec §4.F): the state transition table
//! plus the [`OperationExecutor`](stationd_scheduler::OperationExecutor)
//! implementation that drives it against a [`CloudProvider`].

pub mod executor;
pub mod state_machine;

pub use executor::LifecycleExecutor;
pub use state_machine::legal_transition;

use stationd_provider::{CloudProvider, ProviderCapabilities};
use tracing::info;

/// Probe what the configured provider actually supports before the daemon
/// starts serving requests (SPEC_FULL.md §3). The result is cached by the
/// caller (the daemon binary) and consulted wherever a workstation's
/// `hibernation_capable` flag needs seeding at launch time.
pub async fn probe_capabilities(provider: &dyn CloudProvider) -> stationd_core::Result<ProviderCapabilities> {
    let capabilities = provider.capabilities().await?;
    info!(
        hibernation = capabilities.hibernation,
        resize_in_place = capabilities.resize_in_place,
        volume_attach = capabilities.volume_attach,
        "probed cloud provider capabilities"
    );
    Ok(capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stationd_provider::MockCloudProvider;

    #[tokio::test]
    async fn probe_capabilities_reflects_mock_defaults() {
        let provider = MockCloudProvider::new();
        let capabilities = probe_capabilities(&provider).await.unwrap();
        assert!(capabilities.hibernation);
        assert!(capabilities.volume_attach);
    }
}
