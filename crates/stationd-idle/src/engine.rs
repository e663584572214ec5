//! The idle policy evaluation loop (spec §4.H).
//!
//! The engine never mutates workstation state directly — it only reads
//! metrics, maintains a rolling in-memory window per workstation, and
//! submits `hibernate`/`stop` operations to the scheduler when a
//! workstation has been idle for its policy's full evaluation window and
//! is outside cool-down.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::json;
use stationd_core::domain::{IdleAction, IdleDecision, IdlePolicy, MetricSnapshot, OperationKind, WorkstationState};
use stationd_core::ids::IdlePolicyId;
use stationd_provider::MetricsSource;
use stationd_scheduler::Scheduler;
use stationd_store::Store;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{info, warn};

/// Submitter tag attached to every operation the idle engine synthesizes,
/// so clients can distinguish automated actions from user-initiated ones
/// (spec §4.H step 3).
pub const IDLE_ENGINE_SUBMITTER: &str = "idle-engine";

pub struct IdleEngine {
    store: Arc<Store>,
    metrics: Arc<dyn MetricsSource>,
    scheduler: Arc<Scheduler>,
    windows: Mutex<HashMap<String, VecDeque<MetricSnapshot>>>,
}

impl IdleEngine {
    pub fn new(store: Arc<Store>, metrics: Arc<dyn MetricsSource>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            store,
            metrics,
            scheduler,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate every running, policy-attached workstation once. Returns
    /// the number of workstations an operation was synthesized for.
    pub async fn tick(&self) -> stationd_core::Result<usize> {
        let mut synthesized = 0;
        for workstation in self.store.list_workstations() {
            if workstation.state != WorkstationState::Running {
                continue;
            }
            let Some(policy_id) = workstation.idle_policy else { continue };
            let Some(provider_id) = workstation.provider_id.clone() else { continue };
            let policy = match self.store.get_idle_policy(&policy_id) {
                Ok(policy) => policy,
                Err(err) => {
                    warn!(workstation = %workstation.name, %err, "idle policy not found, skipping evaluation");
                    continue;
                }
            };

            let snapshot = self.metrics.sample(&provider_id).await?;

            let mut updated = workstation.clone();
            updated.last_metric = Some(snapshot.clone());
            let _ = self.store.upsert_workstation(updated);

            let window_full = self.push_sample(&workstation.name, snapshot, policy.evaluation_window_secs);
            let satisfied = window_full && self.window_is_idle(&workstation.name, &policy);
            let in_cooldown = self.in_cooldown(&workstation.name, policy.cool_down_secs);

            if satisfied && !in_cooldown {
                let kind = match policy.action {
                    IdleAction::Stop => OperationKind::Stop,
                    IdleAction::Hibernate => OperationKind::Hibernate,
                };
                let result = self
                    .scheduler
                    .submit(kind, workstation.name.clone(), json!({}), IDLE_ENGINE_SUBMITTER, None)
                    .await;
                let (action_taken, reason) = match &result {
                    Ok(op) => (
                        Some(policy.action),
                        format!("idle thresholds satisfied over {}s window; submitted {}", policy.evaluation_window_secs, op.id),
                    ),
                    Err(err) => (None, format!("idle thresholds satisfied but submission failed: {err}")),
                };
                if action_taken.is_some() {
                    synthesized += 1;
                    info!(workstation = %workstation.name, action = ?policy.action, "idle engine synthesized operation");
                }
                self.record_decision(&workstation.name, policy_id, action_taken, reason);
            } else {
                let reason = if in_cooldown {
                    "idle but within cool-down".to_string()
                } else if !window_full {
                    "evaluation window not yet full".to_string()
                } else {
                    "not idle".to_string()
                };
                self.record_decision(&workstation.name, policy_id, None, reason);
            }
        }
        Ok(synthesized)
    }

    /// Push a sample into the workstation's rolling window, evicting
    /// anything older than `window_secs`. Returns whether the remaining
    /// window now spans the full evaluation period.
    fn push_sample(&self, workstation: &str, snapshot: MetricSnapshot, window_secs: i64) -> bool {
        let mut windows = self.windows.lock();
        let window = windows.entry(workstation.to_string()).or_default();
        window.push_back(snapshot);
        let cutoff = Utc::now() - ChronoDuration::seconds(window_secs);
        while window.front().is_some_and(|s| s.sampled_at < cutoff) {
            window.pop_front();
        }
        window
            .front()
            .is_some_and(|oldest| Utc::now() - oldest.sampled_at >= ChronoDuration::seconds(window_secs))
    }

    /// A workstation is idle when every sample currently in its window is
    /// below every threshold and carries no interactive session (spec
    /// §4.H step 2).
    fn window_is_idle(&self, workstation: &str, policy: &IdlePolicy) -> bool {
        let windows = self.windows.lock();
        let Some(window) = windows.get(workstation) else { return false };
        !window.is_empty()
            && window.iter().all(|sample| {
                sample.cpu_percent < policy.thresholds.cpu_percent
                    && sample.network_bytes_per_sec < policy.thresholds.network_bytes_per_sec
                    && sample.interactive_sessions <= policy.thresholds.interactive_sessions
            })
    }

    fn in_cooldown(&self, workstation: &str, cool_down_secs: i64) -> bool {
        let last_action: Option<DateTime<Utc>> = self
            .store
            .list_idle_decisions(Some(workstation))
            .into_iter()
            .filter(|d| d.action_taken.is_some())
            .map(|d| d.decided_at)
            .max();
        match last_action {
            Some(decided_at) => Utc::now() - decided_at < ChronoDuration::seconds(cool_down_secs),
            None => false,
        }
    }

    fn record_decision(&self, workstation: &str, policy_id: IdlePolicyId, action_taken: Option<IdleAction>, reason: String) {
        let decision = IdleDecision {
            workstation: workstation.to_string(),
            policy_id,
            decided_at: Utc::now(),
            action_taken,
            reason,
        };
        let _ = self.store.push_idle_decision(decision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stationd_core::config::DaemonConfig;
    use stationd_core::domain::{IdleThresholds, LifecycleKind, Size, Workstation};
    use stationd_provider::{MockCloudProvider, MockMetricsSource};
    use stationd_scheduler::{AlwaysAdmit, OperationExecutor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl OperationExecutor for CountingExecutor {
        async fn execute(&self, _operation: &stationd_core::domain::Operation, _handle: &stationd_scheduler::ExecutionHandle) -> stationd_core::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn build(window_secs: i64, cool_down_secs: i64) -> (tempfile::TempDir, Arc<Store>, IdleEngine, Arc<MockMetricsSource>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        let metrics = Arc::new(MockMetricsSource::new());
        let executed = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new(
            store.clone(),
            Arc::new(CountingExecutor(executed)),
            Arc::new(AlwaysAdmit),
            DaemonConfig::default(),
        )
        .unwrap();

        let mut workstation = Workstation::new("w1", Size::S, LifecycleKind::OnDemand);
        workstation.state = WorkstationState::Running;
        workstation.provider_id = Some("p1".to_string());
        let policy_id = IdlePolicyId::new();
        workstation.idle_policy = Some(policy_id);
        store.upsert_workstation(workstation).unwrap();

        store
            .put_idle_policy(IdlePolicy {
                id: policy_id,
                name: "batch".to_string(),
                thresholds: IdleThresholds {
                    cpu_percent: 5.0,
                    network_bytes_per_sec: 1000.0,
                    interactive_sessions: 0,
                },
                evaluation_window_secs: window_secs,
                action: IdleAction::Hibernate,
                cool_down_secs,
            })
            .unwrap();

        let engine = IdleEngine::new(store.clone(), metrics.clone(), scheduler);
        (dir, store, engine, metrics)
    }

    #[tokio::test]
    async fn idle_below_thresholds_with_zero_window_synthesizes_immediately() {
        let (_dir, _store, engine, metrics) = build(0, 300).await;
        metrics.set(
            "p1",
            MetricSnapshot {
                cpu_percent: 0.0,
                network_bytes_per_sec: 0.0,
                interactive_sessions: 0,
                last_user_activity: None,
                sampled_at: Utc::now(),
            },
        );
        let synthesized = engine.tick().await.unwrap();
        assert_eq!(synthesized, 1);
    }

    #[tokio::test]
    async fn busy_metrics_never_synthesize() {
        let (_dir, _store, engine, metrics) = build(0, 300).await;
        metrics.set(
            "p1",
            MetricSnapshot {
                cpu_percent: 90.0,
                network_bytes_per_sec: 0.0,
                interactive_sessions: 0,
                last_user_activity: None,
                sampled_at: Utc::now(),
            },
        );
        let synthesized = engine.tick().await.unwrap();
        assert_eq!(synthesized, 0);
    }

    #[tokio::test]
    async fn cooldown_prevents_immediate_resynthesis() {
        let (_dir, _store, engine, metrics) = build(0, 300).await;
        metrics.set(
            "p1",
            MetricSnapshot {
                cpu_percent: 0.0,
                network_bytes_per_sec: 0.0,
                interactive_sessions: 0,
                last_user_activity: None,
                sampled_at: Utc::now(),
            },
        );
        assert_eq!(engine.tick().await.unwrap(), 1);
        assert_eq!(engine.tick().await.unwrap(), 0);
    }
}
