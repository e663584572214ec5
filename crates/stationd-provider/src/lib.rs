// Copyright 2026 Stationd contributors

//! The cloud-provider and metrics-source ports (spec §4.B, §4.C).
//!
//! A real cloud SDK integration is out of scope (spec §1 Non-goals); this
//! crate defines the narrow verb set everything above it calls through,
//! plus an in-process mock of each port so the rest of the workspace has
//! something to build and test against.

pub mod metrics;
pub mod mock;
pub mod provider;

pub use metrics::MetricsSource;
pub use mock::{MockCloudProvider, MockMetricsSource};
pub use provider::{
    CloudProvider, DescribeResult, ExecRequest, ExecResult, ImageSelector, LaunchResult, LaunchSpec,
    ProviderCapabilities, ProviderState, ResolvedImage, VolumeHandle, VolumeSpec,
};
