//! Request and response shapes for the HTTP API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequestDto {
    pub account_id: Uuid,
    pub plan: String,
    pub billing_cycle: String,
    /// Redirect after a completed checkout; configured default when absent.
    pub success_url: Option<String>,
    /// Redirect after an abandoned checkout; configured default when absent.
    pub cancel_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponseDto {
    pub intent_id: Uuid,
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAckDto {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorDto {
    pub error: String,
    pub code: &'static str,
}

impl ErrorDto {
    pub fn new(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeadLetterDto {
    pub event_id: String,
    pub event_type: String,
    pub reason: String,
    pub parked_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    pub limit: Option<u32>,
}
