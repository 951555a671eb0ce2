//! Request and response bodies for the witness HTTP surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Confidence, DuplicityRecord, EscrowReason, KeyState, Receipt, SignedKeyEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Accepted,
    Duplicate,
    Escrowed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<KeyState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<EscrowReason>,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "query_type", rename_all = "snake_case")]
pub enum QueryRequest {
    State {
        prefix: String,
    },
    Kel {
        prefix: String,
        #[serde(default)]
        start_sn: u64,
        #[serde(default)]
        end_sn: Option<u64>,
    },
    Receipts {
        event_digest: String,
    },
    Duplicity {
        prefix: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub state: KeyState,
    pub confidence: Confidence,
    pub receipt_count: usize,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KelResponse {
    pub events: Vec<SignedKeyEvent>,
    pub count: usize,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptsResponse {
    pub receipts: Vec<Receipt>,
    pub count: usize,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicityResponse {
    pub records: Vec<DuplicityRecord>,
    pub count: usize,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntroductionResponse {
    pub witness: String,
    pub oobi: String,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OobiResponse {
    pub state: KeyState,
    pub oobi: String,
    pub receipt_count: usize,
    pub confidence: Confidence,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub promoted: usize,
    pub expired: usize,
    pub retained: usize,
    pub dropped: usize,
    pub as_of: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_tags() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"query_type":"kel","prefix":"Eabc"}"#).unwrap();
        assert!(matches!(
            req,
            QueryRequest::Kel {
                start_sn: 0,
                end_sn: None,
                ..
            }
        ));

        let req: QueryRequest =
            serde_json::from_str(r#"{"query_type":"receipts","event_digest":"Eabc"}"#).unwrap();
        assert!(matches!(req, QueryRequest::Receipts { .. }));

        assert!(serde_json::from_str::<QueryRequest>(r#"{"query_type":"mailbox"}"#).is_err());
        assert!(serde_json::from_str::<QueryRequest>(r#"{"query_type":"state"}"#).is_err());
    }

    #[test]
    fn test_process_response_field_names() {
        let response = ProcessResponse {
            status: ProcessStatus::Escrowed,
            state: None,
            receipt: None,
            confidence: None,
            reason: Some(EscrowReason::OutOfOrder),
            as_of: Utc::now(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "escrowed");
        assert_eq!(value["reason"], "out_of_order");
        assert!(value.get("asOf").is_some());
        assert!(value.get("state").is_none());
    }
}
