//! Witness storage traits
//!
//! State, log and self-receipt are committed together under an optimistic
//! version check. Receipts and escrow entries are insert-if-absent.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use async_trait::async_trait;

use crate::error::WitnessError;
use crate::types::{
    DuplicityRecord, EscrowEntry, KeyState, Receipt, Seal, SignedKeyEvent, StateVersion,
};

/// Everything written when an event is accepted.
#[derive(Debug, Clone)]
pub struct AcceptedWrite {
    pub state: KeyState,
    pub event: SignedKeyEvent,
    pub receipt: Receipt,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_state(&self, prefix: &str) -> Result<Option<KeyState>, WitnessError>;

    /// Writes state, log entry and receipt atomically, iff the stored version
    /// of `write.state.prefix` still equals `expected` (`None` meaning no
    /// state yet). Otherwise returns [`WitnessError::VersionConflict`].
    async fn commit_accepted(
        &self,
        expected: Option<&StateVersion>,
        write: AcceptedWrite,
    ) -> Result<(), WitnessError>;
}

#[async_trait]
pub trait KelStore: Send + Sync {
    async fn get_event(&self, prefix: &str, sn: u64)
    -> Result<Option<SignedKeyEvent>, WitnessError>;

    /// Events with `start <= sn <= end`, ascending. Unbounded when `end` is None.
    async fn get_events(
        &self,
        prefix: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<Vec<SignedKeyEvent>, WitnessError>;

    /// Whether any accepted event of `prefix` anchors `seal`.
    async fn has_seal(&self, prefix: &str, seal: &Seal) -> Result<bool, WitnessError>;
}

#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Returns false when a receipt from the same witness already exists.
    async fn add_receipt(&self, receipt: &Receipt) -> Result<bool, WitnessError>;

    async fn get_receipts(&self, event_digest: &str) -> Result<Vec<Receipt>, WitnessError>;

    async fn count_receipts(&self, event_digest: &str) -> Result<usize, WitnessError>;
}

#[async_trait]
pub trait EscrowStore: Send + Sync {
    /// Returns false when an entry with the same prefix and digest exists.
    async fn put_escrow(&self, entry: &EscrowEntry) -> Result<bool, WitnessError>;

    async fn list_escrow(&self) -> Result<Vec<EscrowEntry>, WitnessError>;

    async fn remove_escrow(&self, prefix: &str, digest: &str) -> Result<bool, WitnessError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Returns false when a record for the same conflicting digest exists.
    async fn record_duplicity(&self, record: &DuplicityRecord) -> Result<bool, WitnessError>;

    /// Records for one prefix, oldest first.
    async fn get_duplicity(&self, prefix: &str) -> Result<Vec<DuplicityRecord>, WitnessError>;
}

/// A complete backend.
pub trait WitnessStore: StateStore + KelStore + ReceiptStore + EscrowStore + AuditStore {}

impl<T> WitnessStore for T where T: StateStore + KelStore + ReceiptStore + EscrowStore + AuditStore {}
