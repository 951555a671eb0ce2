//! Escrowed events

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SignedKeyEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowReason {
    OutOfOrder,
    MissingDelegationAnchor,
}

impl EscrowReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfOrder => "out_of_order",
            Self::MissingDelegationAnchor => "missing_delegation_anchor",
        }
    }
}

impl fmt::Display for EscrowReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event held until its dependencies arrive. Keyed by (prefix, digest).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowEntry {
    pub prefix: String,
    pub sn: u64,
    pub digest: String,
    pub reason: EscrowReason,
    pub event: SignedKeyEvent,
    pub enqueued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EscrowEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
