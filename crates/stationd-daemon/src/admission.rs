//! Adapts [`stationd_ledger::Ledger`] to the scheduler's [`AdmissionGate`]
//! seam. Kept out of `stationd-ledger` itself since the gate needs a
//! `Store` handle that the ledger crate otherwise only borrows per call.

use async_trait::async_trait;
use stationd_core::ids::ProjectId;
use stationd_core::Result;
use stationd_ledger::Ledger;
use stationd_scheduler::AdmissionGate;
use stationd_store::Store;
use std::sync::Arc;

pub struct LedgerGate {
    store: Arc<Store>,
    ledger: Arc<Ledger>,
}

impl LedgerGate {
    pub fn new(store: Arc<Store>, ledger: Arc<Ledger>) -> Self {
        Self { store, ledger }
    }
}

#[async_trait]
impl AdmissionGate for LedgerGate {
    async fn precheck(&self, project: &ProjectId, estimated_cost: f64) -> Result<()> {
        self.ledger.precheck(&self.store, project, estimated_cost)
    }
}
