//! The full durable snapshot (spec §4.A).
//!
//! `StateDocument` is what gets serialized to `state.json` on every commit.
//! Its on-disk shape is an implementation detail (spec §4.A), not a public
//! contract — callers go through [`crate::Store`]'s entity-scoped methods
//! rather than touching this directly.

use serde::{Deserialize, Serialize};
use stationd_core::domain::{
    IdleDecision, IdlePolicy, Operation, Project, Template, TemplateOrigin, Volume, Workstation,
};
use stationd_core::ids::{IdlePolicyId, OperationId, ProjectId, VolumeId};
use std::collections::BTreeMap;

/// A [`Template`] paired with the origin used to resolve precedence
/// (spec §3: local overrides external).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTemplate {
    pub template: Template,
    pub origin: TemplateOrigin,
}

/// The bound on [`StateDocument::idle_decisions`] (spec §4.H.4's "diagnostic
/// ring buffer").
pub const IDLE_DECISION_RING_CAPACITY: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    pub workstations: BTreeMap<String, Workstation>,
    pub projects: BTreeMap<ProjectId, Project>,
    pub volumes: BTreeMap<VolumeId, Volume>,
    pub operations: BTreeMap<OperationId, Operation>,
    pub templates: Vec<StoredTemplate>,
    pub idle_policies: BTreeMap<IdlePolicyId, IdlePolicy>,
    /// Most recent first, bounded to [`IDLE_DECISION_RING_CAPACITY`].
    pub idle_decisions: std::collections::VecDeque<IdleDecision>,
    /// Monotonic counter, bumped once per committed transaction. Distinct
    /// from any individual entity's `version` field; this one orders
    /// commits against the journal.
    pub version: u64,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            workstations: BTreeMap::new(),
            projects: BTreeMap::new(),
            volumes: BTreeMap::new(),
            operations: BTreeMap::new(),
            templates: Vec::new(),
            idle_policies: BTreeMap::new(),
            idle_decisions: std::collections::VecDeque::new(),
            version: 0,
        }
    }
}

impl StateDocument {
    pub fn push_idle_decision(&mut self, decision: IdleDecision) {
        self.idle_decisions.push_front(decision);
        while self.idle_decisions.len() > IDLE_DECISION_RING_CAPACITY {
            self.idle_decisions.pop_back();
        }
    }
}
