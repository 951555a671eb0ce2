//! Escrow of events whose dependencies have not arrived
//!
//! Sweeps run identifiers in parallel. Entries of one identifier are retried
//! sequentially in ascending sn so a chain of gaps closes in a single pass.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorKind, WitnessError};
use crate::processor::{EventProcessor, ProcessOutcome};
use crate::store::{EscrowStore, WitnessStore};
use crate::types::{EscrowEntry, EscrowReason, SignedKeyEvent};

/// Tally of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub promoted: usize,
    pub expired: usize,
    pub retained: usize,
    /// Rejected, or accepted through another path in the meantime
    pub dropped: usize,
}

impl SweepReport {
    fn merge(mut self, other: SweepReport) -> Self {
        self.promoted += other.promoted;
        self.expired += other.expired;
        self.retained += other.retained;
        self.dropped += other.dropped;
        self
    }
}

pub struct EscrowManager {
    store: Arc<dyn WitnessStore>,
    processor: Arc<EventProcessor>,
    ttl: chrono::Duration,
}

impl EscrowManager {
    pub fn new(store: Arc<dyn WitnessStore>, processor: Arc<EventProcessor>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            store,
            processor,
            ttl,
        }
    }

    /// Holds `event` until a sweep can apply it. Idempotent per (prefix, digest).
    pub async fn enqueue(
        &self,
        event: &SignedKeyEvent,
        reason: EscrowReason,
    ) -> Result<(), WitnessError> {
        let now = Utc::now();
        let entry = EscrowEntry {
            prefix: event.event.prefix.clone(),
            sn: event.event.sn,
            digest: event.event.digest.clone(),
            reason,
            event: event.clone(),
            enqueued_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        if self.store.put_escrow(&entry).await? {
            info!(
                prefix = %entry.prefix,
                sn = entry.sn,
                digest = %entry.digest,
                reason = %reason,
                "Event escrowed"
            );
        } else {
            debug!(prefix = %entry.prefix, digest = %entry.digest, "Event already escrowed");
        }
        Ok(())
    }

    pub async fn pending(&self) -> Result<Vec<EscrowEntry>, WitnessError> {
        self.store.list_escrow().await
    }

    pub async fn sweep(&self) -> Result<SweepReport, WitnessError> {
        self.sweep_at(Utc::now()).await
    }

    /// Sweep treating `now` as the current time for expiry.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, WitnessError> {
        let mut by_prefix: BTreeMap<String, Vec<EscrowEntry>> = BTreeMap::new();
        for entry in self.store.list_escrow().await? {
            by_prefix.entry(entry.prefix.clone()).or_default().push(entry);
        }
        for entries in by_prefix.values_mut() {
            entries.sort_by(|a, b| a.sn.cmp(&b.sn).then(a.enqueued_at.cmp(&b.enqueued_at)));
        }

        let reports = join_all(
            by_prefix
                .into_values()
                .map(|entries| self.sweep_prefix(entries, now)),
        )
        .await;
        let report = reports
            .into_iter()
            .fold(SweepReport::default(), SweepReport::merge);

        info!(
            promoted = report.promoted,
            expired = report.expired,
            retained = report.retained,
            dropped = report.dropped,
            "Escrow sweep complete"
        );
        Ok(report)
    }

    async fn sweep_prefix(&self, entries: Vec<EscrowEntry>, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        for entry in entries {
            if entry.is_expired(now) {
                debug!(prefix = %entry.prefix, sn = entry.sn, "Discarding expired escrow");
                self.remove(&entry).await;
                report.expired += 1;
                continue;
            }

            match self.processor.process(&entry.event).await {
                Ok(ProcessOutcome::Accepted { .. }) => {
                    info!(prefix = %entry.prefix, sn = entry.sn, "Escrowed event promoted");
                    self.remove(&entry).await;
                    report.promoted += 1;
                }
                Ok(ProcessOutcome::Duplicate { .. }) => {
                    self.remove(&entry).await;
                    report.dropped += 1;
                }
                Ok(ProcessOutcome::Escrowed(_)) => report.retained += 1,
                Err(e) => match e.kind() {
                    ErrorKind::Transient => {
                        warn!(prefix = %entry.prefix, error = %e, "Escrow promotion deferred");
                        report.retained += 1;
                    }
                    ErrorKind::Internal => {
                        error!(prefix = %entry.prefix, error = %e, "Escrow promotion failed");
                        report.retained += 1;
                    }
                    _ => {
                        warn!(
                            prefix = %entry.prefix,
                            sn = entry.sn,
                            error = %e,
                            "Escrowed event rejected"
                        );
                        self.remove(&entry).await;
                        report.dropped += 1;
                    }
                },
            }
        }

        report
    }

    async fn remove(&self, entry: &EscrowEntry) {
        if let Err(e) = self.store.remove_escrow(&entry.prefix, &entry.digest).await {
            warn!(prefix = %entry.prefix, error = %e, "Failed to remove escrow entry");
        }
    }
}
