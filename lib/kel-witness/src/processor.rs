//! Event processing
//!
//! Reads state with its version, validates, and commits the successor state,
//! log entry and self-receipt conditioned on that version. A lost race
//! re-runs validation against the fresh state, up to `max_attempts` times.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::WitnessError;
use crate::receipts::ReceiptLedger;
use crate::store::{AcceptedWrite, AuditStore, KelStore, StateStore, WitnessStore};
use crate::types::{DuplicityRecord, EscrowReason, KeyState, Receipt, Seal, SignedKeyEvent};
use crate::validator::{Authority, EventValidator, Validation, ValidationContext};

#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Accepted { state: KeyState, receipt: Receipt },
    /// Already accepted; carries the current state
    Duplicate { state: Option<KeyState> },
    Escrowed(EscrowReason),
}

pub struct EventProcessor {
    store: Arc<dyn WitnessStore>,
    validator: EventValidator,
    ledger: Arc<ReceiptLedger>,
    max_attempts: u32,
}

impl EventProcessor {
    pub fn new(
        store: Arc<dyn WitnessStore>,
        validator: EventValidator,
        ledger: Arc<ReceiptLedger>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            validator,
            ledger,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Validates and, when applicable, commits one event. Rejections are
    /// returned as errors; escrow is reported but not enqueued here.
    pub async fn process(&self, signed: &SignedKeyEvent) -> Result<ProcessOutcome, WitnessError> {
        let event = &signed.event;

        for attempt in 1..=self.max_attempts {
            let state = self.store.get_state(&event.prefix).await?;
            let context = self.context(signed, state.as_ref()).await?;

            match self.validator.validate(signed, state.as_ref(), &context) {
                Validation::Accepted(next) => {
                    let receipt = self.ledger.issue(event, context.now)?;
                    let expected = state.as_ref().map(KeyState::version);
                    let write = AcceptedWrite {
                        state: next.clone(),
                        event: signed.clone(),
                        receipt: receipt.clone(),
                    };
                    match self.store.commit_accepted(expected.as_ref(), write).await {
                        Ok(()) => {
                            info!(
                                prefix = %event.prefix,
                                sn = event.sn,
                                kind = %event.kind,
                                digest = %event.digest,
                                "Event accepted"
                            );
                            return Ok(ProcessOutcome::Accepted {
                                state: next,
                                receipt,
                            });
                        }
                        Err(WitnessError::VersionConflict(_)) => {
                            debug!(
                                prefix = %event.prefix,
                                attempt,
                                "State changed during commit, retrying"
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
                Validation::Duplicate => {
                    debug!(prefix = %event.prefix, sn = event.sn, "Duplicate event");
                    return Ok(ProcessOutcome::Duplicate { state });
                }
                Validation::Escrowed(reason) => {
                    return Ok(ProcessOutcome::Escrowed(reason));
                }
                Validation::Rejected(e) => {
                    if let Some(accepted) = context.settled_digest.as_deref() {
                        if matches!(
                            e,
                            WitnessError::ConflictingEvent { .. }
                                | WitnessError::AlreadyIncepted(_)
                        ) {
                            self.record_duplicity(signed, accepted).await;
                        }
                    }
                    debug!(prefix = %event.prefix, sn = event.sn, error = %e, "Event rejected");
                    return Err(e);
                }
            }
        }

        warn!(prefix = %event.prefix, attempts = self.max_attempts, "Commit retries exhausted");
        Err(WitnessError::TransientConflict {
            prefix: event.prefix.clone(),
            attempts: self.max_attempts,
        })
    }

    async fn context(
        &self,
        signed: &SignedKeyEvent,
        state: Option<&KeyState>,
    ) -> Result<ValidationContext, WitnessError> {
        let event = &signed.event;
        let mut context = ValidationContext::new(Utc::now());

        if let Some(current) = state {
            if event.sn <= current.sn {
                context.settled_digest = self
                    .store
                    .get_event(&event.prefix, event.sn)
                    .await?
                    .map(|settled| settled.event.digest);
                if context.settled_digest.as_deref() != Some(event.digest.as_str()) {
                    context.prior_authority =
                        self.prior_authority(&event.prefix, event.sn).await?;
                }
            }
        }

        if event.kind.is_delegated() {
            let delegator = event
                .delegator
                .as_deref()
                .or_else(|| state.and_then(|s| s.delegator.as_deref()));
            if let Some(delegator) = delegator {
                let seal = Seal {
                    i: event.prefix.clone(),
                    s: event.sn,
                    d: event.digest.clone(),
                };
                context.delegation_anchored = self.store.has_seal(delegator, &seal).await?;
            }
        }

        Ok(context)
    }

    /// The last establishment accepted before `sn`.
    async fn prior_authority(
        &self,
        prefix: &str,
        sn: u64,
    ) -> Result<Option<Authority>, WitnessError> {
        let Some(end) = sn.checked_sub(1) else {
            return Ok(None);
        };
        let events = self.store.get_events(prefix, 0, Some(end)).await?;
        Ok(events
            .iter()
            .rev()
            .find(|signed| signed.event.kind.is_establishment())
            .and_then(|signed| Authority::established_by(&signed.event)))
    }

    /// Keeps evidence of a contradiction. Repeated submissions of the same
    /// conflicting event are stored once.
    async fn record_duplicity(&self, signed: &SignedKeyEvent, accepted: &str) {
        let event = &signed.event;
        warn!(
            prefix = %event.prefix,
            sn = event.sn,
            accepted = %accepted,
            conflicting = %event.digest,
            "Duplicity detected"
        );

        let record = DuplicityRecord {
            prefix: event.prefix.clone(),
            sn: event.sn,
            accepted_digest: accepted.to_string(),
            conflicting_digest: event.digest.clone(),
            event: signed.clone(),
            recorded_at: Utc::now(),
        };
        match self.store.record_duplicity(&record).await {
            Ok(true) => {}
            Ok(false) => debug!(conflicting = %event.digest, "Duplicity already on record"),
            Err(e) => warn!(error = %e, "Failed to record duplicity"),
        }
    }
}
