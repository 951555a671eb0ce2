//! Receipts and confidence

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A witness's signed attestation that it has seen an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub event_digest: String,
    pub witness_aid: String,
    pub signature: String,
    pub received_at: DateTime<Utc>,
}

/// How much this witness can say about an event. There is deliberately no
/// terminal value: one witness never observes global agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    LocalOnly,
    ReceiptThresholdMet,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalOnly => write!(f, "LOCAL_ONLY"),
            Self::ReceiptThresholdMet => write!(f, "RECEIPT_THRESHOLD_MET"),
        }
    }
}
