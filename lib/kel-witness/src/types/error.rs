//! API error types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, WitnessError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    ValidationFailed,
    Duplicity,
    NotFound,
    TransientConflict,
    InternalError,
}

impl From<&WitnessError> for ErrorCode {
    fn from(e: &WitnessError) -> Self {
        match e.kind() {
            ErrorKind::Input => ErrorCode::BadRequest,
            ErrorKind::Validation => ErrorCode::ValidationFailed,
            ErrorKind::Conflict => ErrorCode::Duplicity,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::Transient => ErrorCode::TransientConflict,
            ErrorKind::Internal => ErrorCode::InternalError,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: ErrorCode,
    pub as_of: DateTime<Utc>,
}
