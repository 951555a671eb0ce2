//! Witness - HTTP witness node for key event logs
//!
//! Accepts signed key events, receipts the ones it accepts, escrows the ones
//! that arrive early and answers state, log, receipt and OOBI queries.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

pub mod config;
pub mod handlers;
pub mod server;

pub use config::ServiceConfig;
pub use kel_witness::WitnessError;
pub use server::{create_router, run};
