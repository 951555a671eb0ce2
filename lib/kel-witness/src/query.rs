//! Read-side queries
//!
//! Snapshot reads with no locking. A singular resource that does not exist is
//! `NotFound`; a collection that does not exist is empty.

use std::sync::Arc;

use crate::error::WitnessError;
use crate::receipts::ReceiptLedger;
use crate::store::{AuditStore, KelStore, StateStore, WitnessStore};
use crate::types::{Confidence, DuplicityRecord, KeyState, Receipt, SignedKeyEvent};

/// Key state together with what this witness knows about its latest event.
#[derive(Debug, Clone)]
pub struct StateView {
    pub state: KeyState,
    pub receipt_count: usize,
    pub confidence: Confidence,
}

pub struct QueryService {
    store: Arc<dyn WitnessStore>,
    ledger: Arc<ReceiptLedger>,
}

impl QueryService {
    pub fn new(store: Arc<dyn WitnessStore>, ledger: Arc<ReceiptLedger>) -> Self {
        Self { store, ledger }
    }

    pub async fn get_state(&self, prefix: &str) -> Result<KeyState, WitnessError> {
        self.store
            .get_state(prefix)
            .await?
            .ok_or_else(|| WitnessError::NotFound(format!("key state for {}", prefix)))
    }

    pub async fn get_state_view(&self, prefix: &str) -> Result<StateView, WitnessError> {
        let state = self.get_state(prefix).await?;
        let receipt_count = self.ledger.receipt_count(&state.digest).await?;
        let confidence = crate::receipts::confidence(receipt_count, state.witness_threshold);
        Ok(StateView {
            state,
            receipt_count,
            confidence,
        })
    }

    /// Events with `start_sn <= sn <= end_sn`, ascending.
    pub async fn get_log(
        &self,
        prefix: &str,
        start_sn: u64,
        end_sn: Option<u64>,
    ) -> Result<Vec<SignedKeyEvent>, WitnessError> {
        if let Some(end) = end_sn {
            if end < start_sn {
                return Err(WitnessError::InvalidRequest(format!(
                    "end_sn {} precedes start_sn {}",
                    end, start_sn
                )));
            }
        }
        self.store.get_events(prefix, start_sn, end_sn).await
    }

    pub async fn get_receipts(&self, event_digest: &str) -> Result<Vec<Receipt>, WitnessError> {
        self.ledger.get_receipts(event_digest).await
    }

    pub async fn get_duplicity(&self, prefix: &str) -> Result<Vec<DuplicityRecord>, WitnessError> {
        self.store.get_duplicity(prefix).await
    }
}
