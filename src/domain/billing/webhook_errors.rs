//! Reconciliation-side error types.
//!
//! HTTP status mapping drives the provider's redelivery behavior: 2xx
//! acknowledges (no retry), 4xx rejects permanently, 5xx triggers the
//! provider's own backoff. A 2xx must never be returned unless the event
//! is durably recorded in the ledger.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::DomainError;

/// Errors that occur while reconciling an inbound provider event.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Signature verification failed. Permanent; logged as
    /// security-relevant; never retried.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature timestamp outside the tolerance window. The one
    /// transient-looking verification failure: the provider may retry.
    #[error("Signature timestamp outside tolerance: {0}")]
    ClockSkew(String),

    /// Failed to parse the signature header or event payload.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The event could not be bound to an account and was parked for
    /// manual reconciliation. The webhook still acknowledges receipt.
    #[error("Event parked in dead-letter: {0}")]
    DeadLettered(String),

    /// Optimistic-concurrency retries exhausted.
    #[error("Version conflict persisted after {attempts} attempts")]
    ConflictExhausted { attempts: u32 },

    /// Ledger, store, or dispatcher infrastructure failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ReconcileError {
    /// Returns true if the provider should redeliver this event.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::ClockSkew(_) | ReconcileError::Storage(_)
        )
    }

    /// Maps the error to the webhook endpoint's HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Authenticity failure: reject permanently, no retry.
            ReconcileError::InvalidSignature => StatusCode::BAD_REQUEST,

            // Malformed input: no retry will fix it.
            ReconcileError::ParseError(_) => StatusCode::BAD_REQUEST,

            // Parked events are durably recorded; acknowledge so the
            // provider does not hammer the endpoint.
            ReconcileError::DeadLettered(_) => StatusCode::OK,
            ReconcileError::ConflictExhausted { .. } => StatusCode::OK,

            // Transient: provider retries per its own backoff.
            ReconcileError::ClockSkew(_) => StatusCode::SERVICE_UNAVAILABLE,
            ReconcileError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        ReconcileError::Storage(err.to_string())
    }
}
