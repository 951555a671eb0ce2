//! Witness Error Types

use thiserror::Error;

/// Coarse classification used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing fields
    Input,
    /// Bad digest, signature, threshold or authorization
    Validation,
    NotFound,
    /// Divergent history at an already settled sequence number
    Conflict,
    /// Retry budget exhausted on a concurrent commit
    Transient,
    Internal,
}

#[derive(Error, Debug)]
pub enum WitnessError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid digest: expected {expected}, got {actual}")]
    InvalidDigest { expected: String, actual: String },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("Identifier already incepted: {0}")]
    AlreadyIncepted(String),

    #[error(
        "Conflicting event for {prefix} at sn {sn}: accepted {accepted}, submitted {submitted}"
    )]
    ConflictingEvent {
        prefix: String,
        sn: u64,
        accepted: String,
        submitted: String,
    },

    #[error("Prior digest mismatch: expected {expected}, got {actual}")]
    PriorDigestMismatch { expected: String, actual: String },

    #[error("Unauthorized rotation: {0}")]
    UnauthorizedRotation(String),

    #[error("Witness not designated for {0}")]
    NotDesignated(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("State version changed for {0}")]
    VersionConflict(String),

    #[error("Transient conflict for {prefix} after {attempts} attempts")]
    TransientConflict { prefix: String, attempts: u32 },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl WitnessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEvent(_) | Self::InvalidRequest(_) | Self::JsonError(_) => {
                ErrorKind::Input
            }
            Self::InvalidDigest { .. }
            | Self::InvalidSignature(_)
            | Self::InvalidPrefix(_)
            | Self::AlreadyIncepted(_)
            | Self::PriorDigestMismatch { .. }
            | Self::UnauthorizedRotation(_)
            | Self::NotDesignated(_) => ErrorKind::Validation,
            Self::ConflictingEvent { .. } => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::VersionConflict(_) | Self::TransientConflict { .. } => ErrorKind::Transient,
            Self::StorageError(_) | Self::SigningFailed(_) | Self::Config(_) => {
                ErrorKind::Internal
            }
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for WitnessError {
    fn from(e: redis::RedisError) -> Self {
        WitnessError::StorageError(e.to_string())
    }
}
