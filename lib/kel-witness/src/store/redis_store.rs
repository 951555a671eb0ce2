//! Redis-backed store
//!
//! Key layout under a namespace `ns`:
//! - `ns:state:{prefix}` key state JSON
//! - `ns:version:{prefix}` `sn:digest` version token
//! - `ns:kel:{prefix}` sorted set of signed events scored by sn
//! - `ns:receipts:{digest}` hash of witness aid -> receipt JSON
//! - `ns:escrow:{prefix}` hash of digest -> entry JSON, indexed by `ns:escrow:prefixes`
//! - `ns:duplicity:{prefix}` hash of conflicting digest -> duplicity record JSON

use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};

use super::{AcceptedWrite, AuditStore, EscrowStore, KelStore, ReceiptStore, StateStore};
use crate::error::WitnessError;
use crate::types::{
    DuplicityRecord, EscrowEntry, KeyState, Receipt, Seal, SignedKeyEvent, StateVersion,
};

/// Compare-and-commit: KEYS = version, state, kel, receipts;
/// ARGV = expected version ("" for none), new version, state json, sn,
/// event json, witness aid, receipt json.
const COMMIT_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if (current or '') ~= ARGV[1] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SET', KEYS[2], ARGV[3])
redis.call('ZADD', KEYS[3], ARGV[4], ARGV[5])
redis.call('HSETNX', KEYS[4], ARGV[6], ARGV[7])
return 1
"#;

/// KEYS = escrow hash, escrow index; ARGV = prefix, digest, entry json.
const PUT_ESCROW_SCRIPT: &str = r#"
local inserted = redis.call('HSETNX', KEYS[1], ARGV[2], ARGV[3])
redis.call('SADD', KEYS[2], ARGV[1])
return inserted
"#;

/// KEYS = escrow hash, escrow index; ARGV = prefix, digest.
const REMOVE_ESCROW_SCRIPT: &str = r#"
local removed = redis.call('HDEL', KEYS[1], ARGV[2])
if redis.call('HLEN', KEYS[1]) == 0 then
    redis.call('SREM', KEYS[2], ARGV[1])
end
return removed
"#;

pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
    commit_script: Script,
    put_escrow_script: Script,
    remove_escrow_script: Script,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager, namespace: impl Into<String>) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
            commit_script: Script::new(COMMIT_SCRIPT),
            put_escrow_script: Script::new(PUT_ESCROW_SCRIPT),
            remove_escrow_script: Script::new(REMOVE_ESCROW_SCRIPT),
        }
    }

    pub async fn connect(url: &str, namespace: &str) -> Result<Self, WitnessError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, namespace))
    }

    fn key(&self, kind: &str, id: &str) -> String {
        format!("{}:{}:{}", self.namespace, kind, id)
    }

    fn escrow_index_key(&self) -> String {
        format!("{}:escrow:prefixes", self.namespace)
    }

    async fn escrow_for(&self, prefix: &str) -> Result<Vec<EscrowEntry>, WitnessError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.hvals(self.key("escrow", prefix)).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(WitnessError::from))
            .collect()
    }
}

fn parse_events(raw: Vec<String>) -> Result<Vec<SignedKeyEvent>, WitnessError> {
    raw.iter()
        .map(|json| {
            serde_json::from_str(json)
                .map_err(|e| WitnessError::StorageError(format!("Corrupt log entry: {}", e)))
        })
        .collect()
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get_state(&self, prefix: &str) -> Result<Option<KeyState>, WitnessError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.key("state", prefix)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn commit_accepted(
        &self,
        expected: Option<&StateVersion>,
        write: AcceptedWrite,
    ) -> Result<(), WitnessError> {
        let prefix = &write.state.prefix;
        let expected = expected.map(ToString::to_string).unwrap_or_default();
        let state_json = serde_json::to_string(&write.state)?;
        let event_json = serde_json::to_string(&write.event)?;
        let receipt_json = serde_json::to_string(&write.receipt)?;

        let mut conn = self.conn.clone();
        let committed: i64 = self
            .commit_script
            .key(self.key("version", prefix))
            .key(self.key("state", prefix))
            .key(self.key("kel", prefix))
            .key(self.key("receipts", &write.receipt.event_digest))
            .arg(expected)
            .arg(write.state.version().to_string())
            .arg(state_json)
            .arg(write.state.sn)
            .arg(event_json)
            .arg(&write.receipt.witness_aid)
            .arg(receipt_json)
            .invoke_async(&mut conn)
            .await?;

        if committed == 1 {
            Ok(())
        } else {
            Err(WitnessError::VersionConflict(prefix.clone()))
        }
    }
}

#[async_trait]
impl KelStore for RedisStore {
    async fn get_event(
        &self,
        prefix: &str,
        sn: u64,
    ) -> Result<Option<SignedKeyEvent>, WitnessError> {
        Ok(self.get_events(prefix, sn, Some(sn)).await?.into_iter().next())
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
        let max = end.map_or_else(|| "+inf".to_string(), |end| end.to_string());
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .zrangebyscore(self.key("kel", prefix), start.to_string(), max)
            .await?;
        parse_events(raw)
    }

    async fn has_seal(&self, prefix: &str, seal: &Seal) -> Result<bool, WitnessError> {
        let events = self.get_events(prefix, 0, None).await?;
        Ok(events.iter().any(|signed| signed.event.anchors(seal)))
    }
}

#[async_trait]
impl ReceiptStore for RedisStore {
    async fn add_receipt(&self, receipt: &Receipt) -> Result<bool, WitnessError> {
        let json = serde_json::to_string(receipt)?;
        let mut conn = self.conn.clone();
        let inserted: bool = conn
            .hset_nx(
                self.key("receipts", &receipt.event_digest),
                &receipt.witness_aid,
                json,
            )
            .await?;
        Ok(inserted)
    }

    async fn get_receipts(&self, event_digest: &str) -> Result<Vec<Receipt>, WitnessError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.hvals(self.key("receipts", event_digest)).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(WitnessError::from))
            .collect()
    }

    async fn count_receipts(&self, event_digest: &str) -> Result<usize, WitnessError> {
        let mut conn = self.conn.clone();
        let count: usize = conn.hlen(self.key("receipts", event_digest)).await?;
        Ok(count)
    }
}

#[async_trait]
impl EscrowStore for RedisStore {
    async fn put_escrow(&self, entry: &EscrowEntry) -> Result<bool, WitnessError> {
        let json = serde_json::to_string(entry)?;
        let mut conn = self.conn.clone();
        let inserted: i64 = self
            .put_escrow_script
            .key(self.key("escrow", &entry.prefix))
            .key(self.escrow_index_key())
            .arg(&entry.prefix)
            .arg(&entry.digest)
            .arg(json)
            .invoke_async(&mut conn)
            .await?;
        Ok(inserted == 1)
    }

    async fn list_escrow(&self) -> Result<Vec<EscrowEntry>, WitnessError> {
        let mut conn = self.conn.clone();
        let prefixes: Vec<String> = conn.smembers(self.escrow_index_key()).await?;
        let mut entries = Vec::new();
        for prefix in prefixes {
            entries.extend(self.escrow_for(&prefix).await?);
        }
        Ok(entries)
    }

    async fn remove_escrow(&self, prefix: &str, digest: &str) -> Result<bool, WitnessError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .remove_escrow_script
            .key(self.key("escrow", prefix))
            .key(self.escrow_index_key())
            .arg(prefix)
            .arg(digest)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl AuditStore for RedisStore {
    async fn record_duplicity(&self, record: &DuplicityRecord) -> Result<bool, WitnessError> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let inserted: bool = conn
            .hset_nx(
                self.key("duplicity", &record.prefix),
                &record.conflicting_digest,
                json,
            )
            .await?;
        Ok(inserted)
    }

    async fn get_duplicity(&self, prefix: &str) -> Result<Vec<DuplicityRecord>, WitnessError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.hvals(self.key("duplicity", prefix)).await?;
        let mut records = raw
            .iter()
            .map(|json| serde_json::from_str(json).map_err(WitnessError::from))
            .collect::<Result<Vec<DuplicityRecord>, WitnessError>>()?;
        records.sort_by_key(|record| record.recorded_at);
        Ok(records)
    }
}
