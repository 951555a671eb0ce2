//! KEL witness library
//!
//! Validates, receipts and stores key events for the identifiers this node
//! witnesses, escrowing events whose dependencies have not yet arrived.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

pub mod builder;
pub mod config;
pub mod crypto;
pub mod error;
pub mod escrow;
pub mod machine;
pub mod oobi;
pub mod processor;
pub mod query;
pub mod receipts;
pub mod store;
pub mod types;
pub mod validator;
pub mod witness;

#[cfg(feature = "redis")]
pub use store::RedisStore;

pub use builder::KeyEventBuilder;
pub use config::{WitnessConfig, WitnessIdentity};
pub use crypto::{KeyProvider, P256Verifier, SignatureVerifier, SoftwareKeyProvider};
pub use error::{ErrorKind, WitnessError};
pub use escrow::{EscrowManager, SweepReport};
pub use oobi::{Oobi, OobiResolver, Resolution, SelfIntroduction};
pub use processor::{EventProcessor, ProcessOutcome};
pub use query::{QueryService, StateView};
pub use receipts::{ReceiptLedger, confidence};
pub use store::{
    AcceptedWrite, AuditStore, EscrowStore, KelStore, MemoryStore, ReceiptStore, StateStore,
    WitnessStore,
};
pub use types::{
    Confidence, DuplicityRecord, DuplicityResponse, ErrorCode, ErrorResponse, EscrowEntry,
    EscrowReason, EventKind, IndexedSignature, IntroductionResponse, KelResponse, KeyEvent,
    KeyState, OobiResponse, ProcessResponse, ProcessStatus, QueryRequest, ReceiptsResponse, Receipt,
    Seal, SignedKeyEvent, StateResponse, StateVersion, SweepResponse, Threshold,
};
pub use validator::{Authority, EventValidator, Validation, ValidationContext};
pub use witness::Witness;
