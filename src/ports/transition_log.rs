//! Transition log port.
//!
//! Append-only audit trail of entitlement status changes. Records are
//! appended only when the status actually changes; no-change
//! applications leave no trace here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::SubscriptionStatus;
use crate::domain::foundation::{AccountId, DomainError, EventId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub account_id: AccountId,
    pub event_id: EventId,
    pub from_status: SubscriptionStatus,
    pub to_status: SubscriptionStatus,
    pub occurred_at: Timestamp,
}

#[async_trait]
pub trait TransitionLog: Send + Sync {
    async fn append(&self, record: &TransitionRecord) -> Result<(), DomainError>;

    /// Transition history for an account, newest first.
    async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransitionRecord>, DomainError>;
}
