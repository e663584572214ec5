// Copyright 2026 Stationd contributors

//! The idle policy background loop (spec §4.H) and the operation
//! retention sweep (SPEC_FULL.md §3), driven off the same timer.

pub mod engine;

pub use engine::{IdleEngine, IDLE_ENGINE_SUBMITTER};

use std::sync::Arc;
use std::time::Duration;
use stationd_scheduler::Scheduler;
use tracing::{error, warn};

/// Run the idle-evaluation tick and the retention sweep on
/// `interval_secs` until `shutdown` resolves. Intended to be spawned as
/// its own task by the daemon binary.
pub async fn run(engine: Arc<IdleEngine>, scheduler: Arc<Scheduler>, interval_secs: u64, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = engine.tick().await {
                    warn!(%err, "idle engine tick failed");
                }
                if let Err(err) = scheduler.sweep_retention() {
                    error!(%err, "operation retention sweep failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
