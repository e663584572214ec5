// Copyright 2026 Stationd contributors

//! Durable, crash-consistent state for the `stationd` daemon (spec §4.A).
//!
//! The store keeps one in-memory [`state::StateDocument`] behind a lock,
//! persists it to `state.json` with an atomic write-then-rename on every
//! committed transaction, and appends a one-line summary of each commit to
//! a daily-rotated journal under `journal/`. `state.json` is always the
//! authoritative snapshot — the journal is an audit trail, not a write-ahead
//! log the daemon needs to replay to recover.

pub mod error;
pub mod journal;
pub mod state;

pub use error::{Result, StoreError};
pub use state::{StateDocument, StoredTemplate};

use chrono::Utc;
use journal::JournalWriter;
use parking_lot::Mutex;
use stationd_core::domain::{IdleDecision, IdlePolicy, Operation, Project, Template, TemplateOrigin, Volume, Workstation};
use stationd_core::ids::{IdlePolicyId, OperationId, ProjectId, VolumeId};
use stationd_core::StationError;
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Write `bytes` to `path` by first writing a sibling temp file and
/// `rename`-ing it into place, so a crash mid-write never leaves a
/// truncated `state.json` behind (spec §4.A).
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("state")
    ));
    {
        let mut tmp = std::fs::File::create(&tmp_path)?;
        use std::io::Write;
        tmp.write_all(bytes)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

macro_rules! cas_entity {
    ($get:ident, $list:ident, $upsert:ident, $delete:ident, $field:ident, $key_ty:ty, $val_ty:ty, $label:literal) => {
        pub fn $get(&self, key: &$key_ty) -> Result<$val_ty> {
            let state = self.state.lock();
            state
                .$field
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!(concat!($label, " {}"), key)))
        }

        pub fn $list(&self) -> Vec<$val_ty> {
            self.state.lock().$field.values().cloned().collect()
        }

        /// Insert a brand-new entity, or apply a compare-and-set update to
        /// an existing one. `value.version` must equal the current stored
        /// version (0 for a fresh insert); the persisted copy's version is
        /// incremented by one.
        pub fn $upsert(&self, mut value: $val_ty) -> Result<$val_ty> {
            self.transact(concat!($label, " upserted"), |state| {
                let key = value_key(&value);
                if let Some(existing) = state.$field.get(&key) {
                    if existing.version != value.version {
                        return Err(StoreError::Conflict {
                            entity: format!(concat!($label, " {}"), key),
                            expected: value.version,
                            actual: existing.version,
                        });
                    }
                }
                value.version += 1;
                state.$field.insert(key, value.clone());
                Ok(value)
            })
        }

        pub fn $delete(&self, key: &$key_ty, expected_version: u64) -> Result<()> {
            self.transact(concat!($label, " deleted"), |state| {
                match state.$field.get(key) {
                    None => Err(StoreError::NotFound(format!(concat!($label, " {}"), key))),
                    Some(existing) if existing.version != expected_version => Err(StoreError::Conflict {
                        entity: format!(concat!($label, " {}"), key),
                        expected: expected_version,
                        actual: existing.version,
                    }),
                    Some(_) => {
                        state.$field.remove(key);
                        Ok(())
                    }
                }
            })
        }
    };
}

trait HasKey {
    type Key: Ord + Clone + Display;
    fn key(&self) -> Self::Key;
}

impl HasKey for Workstation {
    type Key = String;
    fn key(&self) -> String {
        self.name.clone()
    }
}

impl HasKey for Project {
    type Key = ProjectId;
    fn key(&self) -> ProjectId {
        self.id
    }
}

impl HasKey for Volume {
    type Key = VolumeId;
    fn key(&self) -> VolumeId {
        self.id
    }
}

fn value_key<T: HasKey>(value: &T) -> T::Key {
    value.key()
}

/// A durable, single-writer store over the daemon's entire domain state.
pub struct Store {
    state: Mutex<StateDocument>,
    journal: Mutex<JournalWriter>,
    state_path: PathBuf,
    sequence: Mutex<u64>,
}

impl Store {
    /// Open (or initialize) a store rooted at `config_dir`. State lives at
    /// `<config_dir>/state.json`, the journal under `<config_dir>/journal/`.
    pub fn open(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.into();
        std::fs::create_dir_all(&config_dir)?;
        let state_path = config_dir.join("state.json");
        let state = if state_path.exists() {
            let raw = std::fs::read_to_string(&state_path)?;
            serde_json::from_str(&raw)
                .map_err(|err| StoreError::Corrupt(format!("{}: {err}", state_path.display())))?
        } else {
            StateDocument::default()
        };
        let sequence = state.version;
        Ok(Self {
            state: Mutex::new(state),
            journal: Mutex::new(JournalWriter::new(config_dir.join("journal"))),
            state_path,
            sequence: Mutex::new(sequence),
        })
    }

    /// A read-only clone of the entire document. Intended for startup
    /// reconciliation and diagnostics, not hot-path reads.
    pub fn snapshot(&self) -> StateDocument {
        self.state.lock().clone()
    }

    /// Run a mutation against a private clone of the state, and only if it
    /// succeeds: persist the clone atomically, append a journal entry, bump
    /// the document version, and swap it in as the new live state. A
    /// failing `f` leaves the live state untouched.
    pub fn transact<F, T>(&self, summary: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce(&mut StateDocument) -> Result<T>,
    {
        let mut state = self.state.lock();
        let mut candidate = state.clone();
        let result = f(&mut candidate)?;
        candidate.version += 1;

        let bytes = serde_json::to_vec_pretty(&candidate)?;
        atomic_write(&self.state_path, &bytes)?;

        let mut sequence = self.sequence.lock();
        *sequence += 1;
        self.journal.lock().append(*sequence, summary, Utc::now())?;

        *state = candidate;
        Ok(result)
    }

    /// Like [`Store::transact`], for callers outside this crate that speak
    /// [`stationd_core::StationError`] rather than [`StoreError`]. Used by
    /// the scheduler to commit an executor's staged domain effect in the
    /// same transaction as the operation's terminal write (spec invariant
    /// 4 / §8 property 3).
    pub fn transact_external<F, T>(&self, summary: impl Into<String>, f: F) -> stationd_core::Result<T>
    where
        F: FnOnce(&mut StateDocument) -> stationd_core::Result<T>,
    {
        self.transact(summary, |state| f(state).map_err(StoreError::from)).map_err(StationError::from)
    }

    cas_entity!(get_workstation, list_workstations, upsert_workstation, delete_workstation, workstations, String, Workstation, "workstation");
    cas_entity!(get_project, list_projects, upsert_project, delete_project, projects, ProjectId, Project, "project");
    cas_entity!(get_volume, list_volumes, upsert_volume, delete_volume, volumes, VolumeId, Volume, "volume");

    // Operations are owned end-to-end by the scheduler, which serializes
    // all access to a given operation itself, so these are plain
    // last-writer-wins persistence rather than CAS.

    pub fn get_operation(&self, id: &OperationId) -> Result<Operation> {
        self.state
            .lock()
            .operations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("operation {id}")))
    }

    pub fn list_operations(&self) -> Vec<Operation> {
        self.state.lock().operations.values().cloned().collect()
    }

    pub fn put_operation(&self, operation: Operation) -> Result<Operation> {
        self.transact(format!("operation {} saved", operation.id), |state| {
            state.operations.insert(operation.id, operation.clone());
            Ok(operation)
        })
    }

    pub fn delete_operation(&self, id: &OperationId) -> Result<()> {
        let id = *id;
        self.transact(format!("operation {id} purged"), move |state| {
            state.operations.remove(&id);
            Ok(())
        })
    }

    pub fn get_idle_policy(&self, id: &IdlePolicyId) -> Result<IdlePolicy> {
        self.state
            .lock()
            .idle_policies
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("idle policy {id}")))
    }

    pub fn list_idle_policies(&self) -> Vec<IdlePolicy> {
        self.state.lock().idle_policies.values().cloned().collect()
    }

    pub fn put_idle_policy(&self, policy: IdlePolicy) -> Result<IdlePolicy> {
        self.transact(format!("idle policy {} saved", policy.id), |state| {
            state.idle_policies.insert(policy.id, policy.clone());
            Ok(policy)
        })
    }

    pub fn delete_idle_policy(&self, id: &IdlePolicyId) -> Result<()> {
        let id = *id;
        self.transact(format!("idle policy {id} removed"), move |state| {
            state.idle_policies.remove(&id);
            Ok(())
        })
    }

    pub fn push_idle_decision(&self, decision: IdleDecision) -> Result<()> {
        self.transact(format!("idle decision recorded for {}", decision.workstation), |state| {
            state.push_idle_decision(decision);
            Ok(())
        })
    }

    pub fn list_idle_decisions(&self, workstation: Option<&str>) -> Vec<IdleDecision> {
        let state = self.state.lock();
        state
            .idle_decisions
            .iter()
            .filter(|d| workstation.map_or(true, |w| d.workstation == w))
            .cloned()
            .collect()
    }

    /// Register a template, overwriting any existing `(name, version,
    /// origin)` match (templates are immutable once published; a
    /// re-register of the same identity is treated as idempotent).
    pub fn put_template(&self, template: Template, origin: TemplateOrigin) -> Result<()> {
        self.transact(format!("template {} {} registered", template.name, template.version), |state| {
            state.templates.retain(|t| {
                !(t.template.name == template.name && t.template.version == template.version && t.origin == origin)
            });
            state.templates.push(StoredTemplate { template, origin });
            Ok(())
        })
    }

    pub fn list_templates(&self) -> Vec<StoredTemplate> {
        self.state.lock().templates.clone()
    }

    pub fn remove_template(&self, name: &str, version: &semver::Version, origin: TemplateOrigin) -> Result<()> {
        let name = name.to_string();
        let version = version.clone();
        self.transact(format!("template {name} {version} removed"), move |state| {
            let before = state.templates.len();
            state
                .templates
                .retain(|t| !(t.template.name == name && t.template.version == version && t.origin == origin));
            if state.templates.len() == before {
                return Err(StoreError::NotFound(format!("template {name} {version}")));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stationd_core::domain::{LifecycleKind, Size};

    fn open_tmp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let (_dir, store) = open_tmp();
        let ws = Workstation::new("alice-ws", Size::M, LifecycleKind::OnDemand);
        let stored = store.upsert_workstation(ws.clone()).unwrap();
        assert_eq!(stored.version, 1);

        let fetched = store.get_workstation(&"alice-ws".to_string()).unwrap();
        assert_eq!(fetched.name, "alice-ws");
        assert_eq!(fetched.version, 1);
    }

    #[test]
    fn stale_version_is_rejected() {
        let (_dir, store) = open_tmp();
        let ws = Workstation::new("alice-ws", Size::M, LifecycleKind::OnDemand);
        store.upsert_workstation(ws.clone()).unwrap();

        // Same stale `version: 0` copy, submitted again, collides with the
        // now-version-1 stored copy.
        let err = store.upsert_workstation(ws).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            let ws = Workstation::new("bob-ws", Size::L, LifecycleKind::Spot);
            store.upsert_workstation(ws).unwrap();
        }
        let reopened = Store::open(dir.path()).unwrap();
        let fetched = reopened.get_workstation(&"bob-ws".to_string()).unwrap();
        assert_eq!(fetched.name, "bob-ws");
    }

    #[test]
    fn delete_requires_matching_version() {
        let (_dir, store) = open_tmp();
        let ws = Workstation::new("carl-ws", Size::S, LifecycleKind::OnDemand);
        let stored = store.upsert_workstation(ws).unwrap();

        assert!(matches!(
            store.delete_workstation(&"carl-ws".to_string(), 0),
            Err(StoreError::Conflict { .. })
        ));
        store.delete_workstation(&"carl-ws".to_string(), stored.version).unwrap();
        assert!(matches!(
            store.get_workstation(&"carl-ws".to_string()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn failed_transaction_does_not_persist() {
        let (_dir, store) = open_tmp();
        let before = store.snapshot().version;
        let result: Result<()> = store.transact("should not land", |_state| {
            Err(StoreError::Corrupt("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.snapshot().version, before);
    }
}
