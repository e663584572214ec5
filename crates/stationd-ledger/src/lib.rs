// Copyright 2026 Stationd contributors

//! Per-minute cost accrual and the project budget gate (spec §4.D).
//!
//! There is exactly one enforcement point: [`Ledger::precheck`], called by
//! the scheduler's admission step before `launch`, `resize`, and
//! `apply-template` are allowed to run. Everything else here just keeps
//! `accrued_cost`/`spent` up to date so `precheck` has something accurate
//! to check against.

pub mod pricing;

use chrono::{DateTime, Utc};
use pricing::hourly_rate;
use stationd_core::domain::WorkstationState;
use stationd_core::ids::ProjectId;
use stationd_core::{ErrorKind, Result, StationError};
use stationd_store::Store;
use std::sync::Mutex;

/// Fraction of a workstation's running rate billed while stopped or
/// hibernated (storage-only charge).
pub struct Ledger {
    stopped_cost_ratio: f64,
    last_tick: Mutex<Option<DateTime<Utc>>>,
}

impl Ledger {
    pub fn new(stopped_cost_ratio: f64) -> Self {
        Self {
            stopped_cost_ratio,
            last_tick: Mutex::new(None),
        }
    }

    /// The billing multiplier for a workstation in the given state.
    /// Transitional states (`Creating`, `Resuming`, `Resizing`, `Stopping`,
    /// `Hibernating`) bill at the full running rate, since the instance is
    /// provider-side allocated throughout. `Deleting`/`Deleted` bill
    /// nothing.
    fn billing_ratio(&self, state: WorkstationState) -> f64 {
        match state {
            WorkstationState::Running
            | WorkstationState::Creating
            | WorkstationState::Resuming
            | WorkstationState::Resizing
            | WorkstationState::Stopping
            | WorkstationState::Hibernating => 1.0,
            WorkstationState::Stopped | WorkstationState::Hibernated => self.stopped_cost_ratio,
            WorkstationState::Deleting | WorkstationState::Deleted | WorkstationState::Error => 0.0,
        }
    }

    /// Accrue cost for every non-deleted workstation for the elapsed time
    /// since the previous call (or since construction, on the first
    /// call — the first tick always accrues zero, since there is no prior
    /// timestamp to measure an interval from). Returns `(workstation,
    /// cost_added)` for every workstation that accrued a non-zero amount.
    pub fn accrue(&self, store: &Store, now: DateTime<Utc>) -> Result<Vec<(String, f64)>> {
        let elapsed_hours = {
            let mut last_tick = self.last_tick.lock().expect("ledger mutex poisoned");
            let elapsed = match *last_tick {
                Some(previous) if now > previous => (now - previous).num_milliseconds() as f64 / 3_600_000.0,
                _ => 0.0,
            };
            *last_tick = Some(now);
            elapsed
        };
        if elapsed_hours <= 0.0 {
            return Ok(Vec::new());
        }

        let mut accrued = Vec::new();
        for workstation in store.list_workstations() {
            if workstation.state == WorkstationState::Deleted {
                continue;
            }
            let ratio = self.billing_ratio(workstation.state);
            if ratio <= 0.0 {
                continue;
            }
            let cost = hourly_rate(&workstation.size) * ratio * elapsed_hours;
            if cost <= 0.0 {
                continue;
            }

            let name = workstation.name.clone();
            let project = workstation.project;
            let mut updated = workstation;
            updated.accrued_cost += cost;
            store.upsert_workstation(updated)?;

            if let Some(project_id) = project {
                if let Ok(mut project) = store.get_project(&project_id) {
                    project.spent += cost;
                    store.upsert_project(project)?;
                }
            }

            accrued.push((name, cost));
        }
        Ok(accrued)
    }

    pub fn current_spend(&self, store: &Store, project_id: &ProjectId) -> Result<f64> {
        Ok(store.get_project(project_id)?.spent)
    }

    pub fn remaining(&self, store: &Store, project_id: &ProjectId) -> Result<Option<f64>> {
        Ok(store.get_project(project_id)?.remaining())
    }

    /// The one budget enforcement point (spec §4.D). Returns
    /// `ErrorKind::BudgetExceeded` only when the project has a hard
    /// (`budget.total`) limit and `estimated_cost` would exceed it;
    /// `per_period` budgets are advisory and are not enforced here.
    pub fn precheck(&self, store: &Store, project_id: &ProjectId, estimated_cost: f64) -> Result<()> {
        let project = store.get_project(project_id)?;
        if let Some(remaining) = project.remaining() {
            if estimated_cost > remaining {
                return Err(StationError::new(
                    ErrorKind::BudgetExceeded,
                    format!(
                        "project {} has {remaining:.2} remaining, estimated cost is {estimated_cost:.2}",
                        project.name
                    ),
                )
                .with_remediation("raise the project budget or stop other workstations in this project"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stationd_core::domain::{Budget, LifecycleKind, Project, Size, Workstation};

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn first_tick_accrues_nothing() {
        let (_dir, store) = open_store();
        let ws = Workstation::new("w1", Size::M, LifecycleKind::OnDemand);
        store.upsert_workstation(ws).unwrap();

        let ledger = Ledger::new(0.10);
        let accrued = ledger.accrue(&store, Utc::now()).unwrap();
        assert!(accrued.is_empty());
    }

    #[test]
    fn running_workstation_accrues_full_rate() {
        let (_dir, store) = open_store();
        let mut ws = Workstation::new("w1", Size::M, LifecycleKind::OnDemand);
        ws.state = WorkstationState::Running;
        store.upsert_workstation(ws).unwrap();

        let ledger = Ledger::new(0.10);
        let t0 = Utc::now();
        ledger.accrue(&store, t0).unwrap();
        let t1 = t0 + Duration::hours(1);
        let accrued = ledger.accrue(&store, t1).unwrap();

        assert_eq!(accrued.len(), 1);
        assert!((accrued[0].1 - hourly_rate(&Size::M)).abs() < 1e-6);
    }

    #[test]
    fn stopped_workstation_accrues_reduced_rate() {
        let (_dir, store) = open_store();
        let mut ws = Workstation::new("w1", Size::L, LifecycleKind::OnDemand);
        ws.state = WorkstationState::Stopped;
        store.upsert_workstation(ws).unwrap();

        let ledger = Ledger::new(0.20);
        let t0 = Utc::now();
        ledger.accrue(&store, t0).unwrap();
        let t1 = t0 + Duration::hours(2);
        let accrued = ledger.accrue(&store, t1).unwrap();

        let expected = hourly_rate(&Size::L) * 0.20 * 2.0;
        assert!((accrued[0].1 - expected).abs() < 1e-6);
    }

    #[test]
    fn precheck_rejects_over_budget_request() {
        let (_dir, store) = open_store();
        let mut project = Project::new("proj", "alice");
        project.budget = Some(Budget { total: Some(5.0), per_period: None });
        project.spent = 4.5;
        store.upsert_project(project.clone()).unwrap();

        let ledger = Ledger::new(0.10);
        let err = ledger.precheck(&store, &project.id, 1.0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BudgetExceeded);
    }

    #[test]
    fn precheck_allows_unbudgeted_project() {
        let (_dir, store) = open_store();
        let project = Project::new("proj", "alice");
        store.upsert_project(project.clone()).unwrap();

        let ledger = Ledger::new(0.10);
        ledger.precheck(&store, &project.id, 1_000_000.0).unwrap();
    }
}
