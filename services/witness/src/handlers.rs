//! Witness REST API Handlers
//!
//! Every response, success or error, carries `asOf`: the local time the
//! answer was produced.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use kel_witness::{
    DuplicityResponse, ErrorCode, ErrorKind, ErrorResponse, IntroductionResponse, KelResponse,
    OobiResponse, ProcessOutcome, ProcessResponse, ProcessStatus, QueryRequest, ReceiptsResponse,
    SignedKeyEvent, StateResponse, SweepResponse, Witness, WitnessError,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub witness: Arc<Witness>,
}

// ==================== Error Handling ====================

pub struct ApiError(pub StatusCode, pub Json<ErrorResponse>);

impl ApiError {
    fn new(status: StatusCode, code: ErrorCode, msg: impl Into<String>) -> Self {
        ApiError(
            status,
            Json(ErrorResponse {
                error: msg.into(),
                code,
                as_of: Utc::now(),
            }),
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::BadRequest, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, msg)
    }
}

impl From<WitnessError> for ApiError {
    fn from(e: WitnessError) -> Self {
        let status = match e.kind() {
            ErrorKind::Input | ErrorKind::Validation | ErrorKind::Conflict => {
                StatusCode::BAD_REQUEST
            }
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => {
                tracing::error!("Internal error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, ErrorCode::from(&e), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// ==================== Health Check ====================

pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ==================== Event Handlers ====================

/// Submit one signed key event.
///
/// - `200 accepted` with the new state, the self-receipt and its confidence
/// - `200 duplicate` with the current state
/// - `202 escrowed` with the reason the event is waiting
/// - `400` for malformed, invalid or conflicting events
pub async fn process_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<ProcessResponse>), ApiError> {
    let event: SignedKeyEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid event: {}", e)))?;

    let (status, response) = match state.witness.submit(&event).await? {
        ProcessOutcome::Accepted { state: key_state, receipt } => {
            let confidence = state
                .witness
                .ledger()
                .compute_confidence(&key_state.digest, &key_state)
                .await?;
            (
                StatusCode::OK,
                ProcessResponse {
                    status: ProcessStatus::Accepted,
                    state: Some(key_state),
                    receipt: Some(receipt),
                    confidence: Some(confidence),
                    reason: None,
                    as_of: Utc::now(),
                },
            )
        }
        ProcessOutcome::Duplicate { state: key_state } => (
            StatusCode::OK,
            ProcessResponse {
                status: ProcessStatus::Duplicate,
                state: key_state,
                receipt: None,
                confidence: None,
                reason: None,
                as_of: Utc::now(),
            },
        ),
        ProcessOutcome::Escrowed(reason) => (
            StatusCode::ACCEPTED,
            ProcessResponse {
                status: ProcessStatus::Escrowed,
                state: None,
                receipt: None,
                confidence: None,
                reason: Some(reason),
                as_of: Utc::now(),
            },
        ),
    };

    Ok((status, Json(response)))
}

// ==================== Query Handlers ====================

/// Dispatch on `query_type`: `state`, `kel`, `receipts` or `duplicity`.
pub async fn query(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: QueryRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid query: {}", e)))?;
    let query = state.witness.query();

    let response = match request {
        QueryRequest::State { prefix } => {
            let view = query.get_state_view(&prefix).await?;
            Json(StateResponse {
                state: view.state,
                confidence: view.confidence,
                receipt_count: view.receipt_count,
                as_of: Utc::now(),
            })
            .into_response()
        }
        QueryRequest::Kel {
            prefix,
            start_sn,
            end_sn,
        } => {
            let events = query.get_log(&prefix, start_sn, end_sn).await?;
            Json(KelResponse {
                count: events.len(),
                events,
                as_of: Utc::now(),
            })
            .into_response()
        }
        QueryRequest::Receipts { event_digest } => {
            let receipts = query.get_receipts(&event_digest).await?;
            Json(ReceiptsResponse {
                count: receipts.len(),
                receipts,
                as_of: Utc::now(),
            })
            .into_response()
        }
        QueryRequest::Duplicity { prefix } => {
            let records = query.get_duplicity(&prefix).await?;
            Json(DuplicityResponse {
                count: records.len(),
                records,
                as_of: Utc::now(),
            })
            .into_response()
        }
    };

    Ok(response)
}

// ==================== OOBI Handlers ====================

pub async fn introduce(State(state): State<Arc<AppState>>) -> Json<IntroductionResponse> {
    let intro = state.witness.oobi().resolve_self();
    Json(IntroductionResponse {
        witness: intro.aid,
        oobi: intro.oobi,
        as_of: Utc::now(),
    })
}

pub async fn resolve_oobi(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OobiResponse>, ApiError> {
    let resolution = state.witness.oobi().resolve(&id).await?;
    Ok(Json(OobiResponse {
        state: resolution.state,
        oobi: resolution.introduction_url,
        receipt_count: resolution.receipt_count,
        confidence: resolution.confidence,
        as_of: Utc::now(),
    }))
}

/// Controller OOBI naming a witness. Only this witness's own AID resolves.
pub async fn resolve_witness_oobi(
    State(state): State<Arc<AppState>>,
    Path((id, witness)): Path<(String, String)>,
) -> Result<Json<OobiResponse>, ApiError> {
    if witness != state.witness.aid() {
        return Err(ApiError::not_found(format!("Unknown witness: {}", witness)));
    }
    resolve_oobi(State(state), Path(id)).await
}

// ==================== Escrow Handlers ====================

/// Retry escrowed events. Also run periodically by the service itself.
pub async fn sweep_escrow(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, ApiError> {
    let report = state.witness.sweep().await?;
    Ok(Json(SweepResponse {
        promoted: report.promoted,
        expired: report.expired,
        retained: report.retained,
        dropped: report.dropped,
        as_of: Utc::now(),
    }))
}
