//! Receipt ledger and confidence accounting

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::WitnessIdentity;
use crate::error::WitnessError;
use crate::store::{ReceiptStore, WitnessStore};
use crate::types::{Confidence, KeyEvent, KeyState, Receipt};

/// `ReceiptThresholdMet` iff distinct receipts reach the witness threshold.
pub fn confidence(receipt_count: usize, witness_threshold: u32) -> Confidence {
    if receipt_count >= witness_threshold as usize {
        Confidence::ReceiptThresholdMet
    } else {
        Confidence::LocalOnly
    }
}

pub struct ReceiptLedger {
    store: Arc<dyn WitnessStore>,
    identity: WitnessIdentity,
}

impl ReceiptLedger {
    pub fn new(store: Arc<dyn WitnessStore>, identity: WitnessIdentity) -> Self {
        Self { store, identity }
    }

    pub fn witness_aid(&self) -> &str {
        self.identity.aid()
    }

    /// Signs this witness's receipt for `event`. Not persisted here: the
    /// self-receipt is committed together with the event.
    pub fn issue(&self, event: &KeyEvent, now: DateTime<Utc>) -> Result<Receipt, WitnessError> {
        let signature = self.identity.sign(&event.signing_bytes()?)?;
        Ok(Receipt {
            event_digest: event.digest.clone(),
            witness_aid: self.identity.aid().to_string(),
            signature,
            received_at: now,
        })
    }

    /// Idempotent: a second receipt from the same witness is ignored.
    pub async fn record_receipt(
        &self,
        event_digest: &str,
        witness_aid: &str,
        signature: &str,
    ) -> Result<bool, WitnessError> {
        let receipt = Receipt {
            event_digest: event_digest.to_string(),
            witness_aid: witness_aid.to_string(),
            signature: signature.to_string(),
            received_at: Utc::now(),
        };
        let inserted = self.store.add_receipt(&receipt).await?;
        if inserted {
            tracing::debug!(digest = %event_digest, witness = %witness_aid, "Receipt recorded");
        }
        Ok(inserted)
    }

    pub async fn get_receipts(&self, event_digest: &str) -> Result<Vec<Receipt>, WitnessError> {
        self.store.get_receipts(event_digest).await
    }

    pub async fn receipt_count(&self, event_digest: &str) -> Result<usize, WitnessError> {
        self.store.count_receipts(event_digest).await
    }

    pub async fn compute_confidence(
        &self,
        event_digest: &str,
        state: &KeyState,
    ) -> Result<Confidence, WitnessError> {
        let count = self.receipt_count(event_digest).await?;
        Ok(confidence(count, state.witness_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::KeyEventBuilder;
    use crate::crypto::{P256Verifier, SignatureVerifier, SoftwareKeyProvider};
    use crate::machine;
    use crate::store::MemoryStore;

    fn ledger() -> ReceiptLedger {
        let identity = WitnessIdentity::new(Arc::new(SoftwareKeyProvider::generate()));
        ReceiptLedger::new(Arc::new(MemoryStore::new()), identity)
    }

    #[test]
    fn test_confidence_threshold() {
        assert_eq!(confidence(0, 0), Confidence::ReceiptThresholdMet);
        assert_eq!(confidence(1, 2), Confidence::LocalOnly);
        assert_eq!(confidence(2, 2), Confidence::ReceiptThresholdMet);
        assert_eq!(confidence(3, 2), Confidence::ReceiptThresholdMet);
    }

    #[test]
    fn test_confidence_never_final() {
        let rendered: Vec<String> = [Confidence::LocalOnly, Confidence::ReceiptThresholdMet]
            .iter()
            .map(|c| serde_json::to_string(c).unwrap())
            .collect();
        assert_eq!(
            rendered,
            vec!["\"LOCAL_ONLY\"", "\"RECEIPT_THRESHOLD_MET\""]
        );
    }

    #[test]
    fn test_self_receipt_verifies_under_witness_aid() {
        let ledger = ledger();
        let icp = KeyEventBuilder::new(1).incept().unwrap();
        let receipt = ledger.issue(&icp.event, Utc::now()).unwrap();
        assert_eq!(receipt.witness_aid, ledger.witness_aid());
        assert!(P256Verifier.verify(
            &receipt.witness_aid,
            &icp.event.signing_bytes().unwrap(),
            &receipt.signature
        ));
    }

    #[tokio::test]
    async fn test_receipts_accumulate_toward_threshold() {
        let ledger = ledger();
        let icp = KeyEventBuilder::new(1)
            .with_witnesses(vec!["w1".into(), "w2".into()], 2)
            .incept()
            .unwrap();
        let state = machine::apply(None, &icp.event, Utc::now()).unwrap();
        let digest = &icp.event.digest;

        assert_eq!(
            ledger.compute_confidence(digest, &state).await.unwrap(),
            Confidence::LocalOnly
        );
        assert!(ledger.record_receipt(digest, "w1", "sig1").await.unwrap());
        assert!(!ledger.record_receipt(digest, "w1", "sig1").await.unwrap());
        assert_eq!(
            ledger.compute_confidence(digest, &state).await.unwrap(),
            Confidence::LocalOnly
        );
        assert!(ledger.record_receipt(digest, "w2", "sig2").await.unwrap());
        assert_eq!(
            ledger.compute_confidence(digest, &state).await.unwrap(),
            Confidence::ReceiptThresholdMet
        );
        assert_eq!(ledger.get_receipts(digest).await.unwrap().len(), 2);
    }
}
