//! Dead-letter queue port.
//!
//! Events that cannot be safely applied (no account correlation,
//! exhausted conflict retries, unrecognized provider status) are parked
//! here with their full payload for manual reconciliation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, EventId, Timestamp};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub event_id: EventId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub reason: String,
    pub parked_at: Timestamp,
}

impl DeadLetterEntry {
    pub fn new(
        event_id: EventId,
        event_type: String,
        payload: serde_json::Value,
        reason: String,
    ) -> Self {
        Self {
            event_id,
            event_type,
            payload,
            reason,
            parked_at: Timestamp::now(),
        }
    }
}

#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn park(&self, entry: &DeadLetterEntry) -> Result<(), DomainError>;

    /// Parked events, newest first.
    async fn list(&self, limit: u32) -> Result<Vec<DeadLetterEntry>, DomainError>;
}
