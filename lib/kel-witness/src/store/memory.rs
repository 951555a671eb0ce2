//! In-process store

use std::{
    collections::{BTreeMap, HashMap},
    sync::RwLock,
};

use async_trait::async_trait;

use super::{AcceptedWrite, AuditStore, EscrowStore, KelStore, ReceiptStore, StateStore};
use crate::error::WitnessError;
use crate::types::{
    DuplicityRecord, EscrowEntry, KeyState, Receipt, Seal, SignedKeyEvent, StateVersion,
};

#[derive(Default)]
struct Inner {
    states: HashMap<String, KeyState>,
    kels: HashMap<String, BTreeMap<u64, SignedKeyEvent>>,
    /// event digest -> witness aid -> receipt
    receipts: HashMap<String, BTreeMap<String, Receipt>>,
    /// prefix -> event digest -> entry
    escrow: HashMap<String, BTreeMap<String, EscrowEntry>>,
    /// prefix -> conflicting digest -> record
    duplicity: HashMap<String, BTreeMap<String, DuplicityRecord>>,
}

/// Store backed by in-process maps. Every operation holds the lock only for
/// the duration of a map access, never across an await.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

fn poisoned() -> WitnessError {
    WitnessError::StorageError("memory store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> Result<T, WitnessError> {
        let guard = self.inner.read().map_err(|_| poisoned())?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> Result<T, WitnessError> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;
        Ok(f(&mut guard))
    }
}

fn insert_receipt(inner: &mut Inner, receipt: &Receipt) -> bool {
    let by_witness = inner
        .receipts
        .entry(receipt.event_digest.clone())
        .or_default();
    if by_witness.contains_key(&receipt.witness_aid) {
        return false;
    }
    by_witness.insert(receipt.witness_aid.clone(), receipt.clone());
    true
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_state(&self, prefix: &str) -> Result<Option<KeyState>, WitnessError> {
        self.read(|inner| inner.states.get(prefix).cloned())
    }

    async fn commit_accepted(
        &self,
        expected: Option<&StateVersion>,
        write: AcceptedWrite,
    ) -> Result<(), WitnessError> {
        self.write(|inner| {
            let prefix = write.state.prefix.clone();
            let current = inner.states.get(&prefix).map(KeyState::version);
            if current.as_ref() != expected {
                return Err(WitnessError::VersionConflict(prefix));
            }
            inner
                .kels
                .entry(prefix.clone())
                .or_default()
                .insert(write.state.sn, write.event);
            insert_receipt(inner, &write.receipt);
            inner.states.insert(prefix, write.state);
            Ok(())
        })?
    }
}

#[async_trait]
impl KelStore for MemoryStore {
    async fn get_event(
        &self,
        prefix: &str,
        sn: u64,
    ) -> Result<Option<SignedKeyEvent>, WitnessError> {
        self.read(|inner| inner.kels.get(prefix).and_then(|kel| kel.get(&sn)).cloned())
    }

    async fn get_events(
        &self,
        prefix: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<Vec<SignedKeyEvent>, WitnessError> {
        if end.is_some_and(|end| end < start) {
            return Ok(vec![]);
        }
        self.read(|inner| match inner.kels.get(prefix) {
            Some(kel) => kel
                .range(start..=end.unwrap_or(u64::MAX))
                .map(|(_, event)| event.clone())
                .collect(),
            None => vec![],
        })
    }

    async fn has_seal(&self, prefix: &str, seal: &Seal) -> Result<bool, WitnessError> {
        self.read(|inner| {
            inner
                .kels
                .get(prefix)
                .is_some_and(|kel| kel.values().any(|signed| signed.event.anchors(seal)))
        })
    }
}

#[async_trait]
impl ReceiptStore for MemoryStore {
    async fn add_receipt(&self, receipt: &Receipt) -> Result<bool, WitnessError> {
        self.write(|inner| insert_receipt(inner, receipt))
    }

    async fn get_receipts(&self, event_digest: &str) -> Result<Vec<Receipt>, WitnessError> {
        self.read(|inner| {
            inner
                .receipts
                .get(event_digest)
                .map(|by_witness| by_witness.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn count_receipts(&self, event_digest: &str) -> Result<usize, WitnessError> {
        self.read(|inner| inner.receipts.get(event_digest).map_or(0, BTreeMap::len))
    }
}

#[async_trait]
impl EscrowStore for MemoryStore {
    async fn put_escrow(&self, entry: &EscrowEntry) -> Result<bool, WitnessError> {
        self.write(|inner| {
            let held = inner.escrow.entry(entry.prefix.clone()).or_default();
            if held.contains_key(&entry.digest) {
                return false;
            }
            held.insert(entry.digest.clone(), entry.clone());
            true
        })
    }

    async fn list_escrow(&self) -> Result<Vec<EscrowEntry>, WitnessError> {
        self.read(|inner| {
            inner
                .escrow
                .values()
                .flat_map(|held| held.values().cloned())
                .collect()
        })
    }

    async fn remove_escrow(&self, prefix: &str, digest: &str) -> Result<bool, WitnessError> {
        self.write(|inner| {
            let Some(held) = inner.escrow.get_mut(prefix) else {
                return false;
            };
            let removed = held.remove(digest).is_some();
            if held.is_empty() {
                inner.escrow.remove(prefix);
            }
            removed
        })
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn record_duplicity(&self, record: &DuplicityRecord) -> Result<bool, WitnessError> {
        self.write(|inner| {
            let records = inner.duplicity.entry(record.prefix.clone()).or_default();
            if records.contains_key(&record.conflicting_digest) {
                return false;
            }
            records.insert(record.conflicting_digest.clone(), record.clone());
            true
        })
    }

    async fn get_duplicity(&self, prefix: &str) -> Result<Vec<DuplicityRecord>, WitnessError> {
        let mut records = self.read(|inner| {
            inner
                .duplicity
                .get(prefix)
                .map(|records| records.values().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        })?;
        records.sort_by_key(|record| record.recorded_at);
        Ok(records)
    }
}
