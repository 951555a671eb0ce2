//! Key state and its version token

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventKind, Threshold};
use crate::error::WitnessError;

/// Current key state of one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyState {
    pub prefix: String,
    pub sn: u64,
    /// Digest of the last applied event
    pub digest: String,
    /// Kind of the last applied event
    pub last_event_kind: EventKind,
    pub signing_threshold: Threshold,
    pub keys: Vec<String>,
    pub next_key_digests: Vec<String>,
    pub witness_threshold: u32,
    pub witnesses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegator: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl KeyState {
    pub fn version(&self) -> StateVersion {
        StateVersion {
            sn: self.sn,
            digest: self.digest.clone(),
        }
    }

    pub fn is_delegated(&self) -> bool {
        self.delegator.is_some()
    }
}

/// Optimistic concurrency token, rendered as `sn:digest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateVersion {
    pub sn: u64,
    pub digest: String,
}

impl fmt::Display for StateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sn, self.digest)
    }
}

impl FromStr for StateVersion {
    type Err = WitnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sn, digest) = s
            .split_once(':')
            .ok_or_else(|| WitnessError::StorageError(format!("Malformed version: {}", s)))?;
        let sn = sn
            .parse()
            .map_err(|_| WitnessError::StorageError(format!("Malformed version: {}", s)))?;
        Ok(Self {
            sn,
            digest: digest.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        let version = StateVersion {
            sn: 4,
            digest: "Eabc".to_string(),
        };
        assert_eq!(version.to_string(), "4:Eabc");
        assert_eq!("4:Eabc".parse::<StateVersion>().unwrap(), version);
        assert!("nonsense".parse::<StateVersion>().is_err());
        assert!("x:Eabc".parse::<StateVersion>().is_err());
    }
}
