//! Witness facade
//!
//! Wires the processor, escrow, ledger, query and OOBI components around one
//! store and one signing identity.

use std::sync::Arc;

use crate::config::{WitnessConfig, WitnessIdentity};
use crate::crypto::{P256Verifier, SignatureVerifier};
use crate::error::WitnessError;
use crate::escrow::{EscrowManager, SweepReport};
use crate::oobi::OobiResolver;
use crate::processor::{EventProcessor, ProcessOutcome};
use crate::query::QueryService;
use crate::receipts::ReceiptLedger;
use crate::store::WitnessStore;
use crate::types::SignedKeyEvent;
use crate::validator::EventValidator;

pub struct Witness {
    config: WitnessConfig,
    identity: WitnessIdentity,
    processor: Arc<EventProcessor>,
    escrow: EscrowManager,
    ledger: Arc<ReceiptLedger>,
    query: Arc<QueryService>,
    oobi: OobiResolver,
}

impl Witness {
    pub fn new(
        config: WitnessConfig,
        identity: WitnessIdentity,
        store: Arc<dyn WitnessStore>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        let validator =
            EventValidator::new(verifier, identity.clone(), config.require_designation);
        let ledger = Arc::new(ReceiptLedger::new(store.clone(), identity.clone()));
        let processor = Arc::new(EventProcessor::new(
            store.clone(),
            validator,
            ledger.clone(),
            config.max_commit_retries,
        ));
        let escrow = EscrowManager::new(store.clone(), processor.clone(), config.escrow_ttl);
        let query = Arc::new(QueryService::new(store, ledger.clone()));
        let oobi = OobiResolver::new(
            config.public_url.clone(),
            identity.aid().to_string(),
            query.clone(),
        );

        Self {
            config,
            identity,
            processor,
            escrow,
            ledger,
            query,
            oobi,
        }
    }

    /// A witness verifying P-256 controller signatures.
    pub fn with_store(
        config: WitnessConfig,
        identity: WitnessIdentity,
        store: Arc<dyn WitnessStore>,
    ) -> Self {
        Self::new(config, identity, store, Arc::new(P256Verifier))
    }

    /// Processes a submitted event, escrowing it when its dependencies are
    /// missing.
    pub async fn submit(&self, event: &SignedKeyEvent) -> Result<ProcessOutcome, WitnessError> {
        let outcome = self.processor.process(event).await?;
        if let ProcessOutcome::Escrowed(reason) = &outcome {
            self.escrow.enqueue(event, *reason).await?;
        }
        Ok(outcome)
    }

    pub async fn sweep(&self) -> Result<SweepReport, WitnessError> {
        self.escrow.sweep().await
    }

    pub fn aid(&self) -> &str {
        self.identity.aid()
    }

    pub fn config(&self) -> &WitnessConfig {
        &self.config
    }

    pub fn escrow(&self) -> &EscrowManager {
        &self.escrow
    }

    pub fn ledger(&self) -> &ReceiptLedger {
        &self.ledger
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn oobi(&self) -> &OobiResolver {
        &self.oobi
    }
}
