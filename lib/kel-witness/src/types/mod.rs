//! Shared types

mod api;
mod audit;
mod error;
mod escrow;
mod events;
mod receipt;
mod state;

pub use api::{
    DuplicityResponse, IntroductionResponse, KelResponse, OobiResponse, ProcessResponse,
    ProcessStatus, QueryRequest, ReceiptsResponse, StateResponse, SweepResponse,
};
pub use audit::DuplicityRecord;
pub use error::{ErrorCode, ErrorResponse};
pub use escrow::{EscrowEntry, EscrowReason};
pub use events::{EventKind, IndexedSignature, KeyEvent, Seal, SignedKeyEvent, Threshold};
pub use receipt::{Confidence, Receipt};
pub use state::{KeyState, StateVersion};
