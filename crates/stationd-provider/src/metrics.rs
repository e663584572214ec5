//! The `MetricsSource` port (spec §4.C), consumed by `stationd-idle`'s
//! evaluation loop.

use async_trait::async_trait;
use stationd_core::domain::MetricSnapshot;
use stationd_core::Result;

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Sample current metrics for a running workstation. Implementations
    /// should return `Ok` with a best-effort snapshot rather than erroring
    /// on a single missing signal (e.g. no active sessions) — the idle
    /// engine treats absent signals as "idle on this axis".
    async fn sample(&self, provider_id: &str) -> Result<MetricSnapshot>;
}
