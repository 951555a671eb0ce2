//! Duplicity evidence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SignedKeyEvent;

/// A signed event that contradicts history this witness already settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicityRecord {
    pub prefix: String,
    pub sn: u64,
    pub accepted_digest: String,
    pub conflicting_digest: String,
    pub event: SignedKeyEvent,
    pub recorded_at: DateTime<Utc>,
}
