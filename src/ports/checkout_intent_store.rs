//! Checkout intent store port.

use async_trait::async_trait;

use crate::domain::billing::CheckoutIntent;
use crate::domain::foundation::{DomainError, IntentId, Timestamp};

#[async_trait]
pub trait CheckoutIntentStore: Send + Sync {
    async fn create(&self, intent: &CheckoutIntent) -> Result<(), DomainError>;

    /// Records the processor session id once the session exists.
    async fn set_session(&self, intent_id: IntentId, session_id: &str) -> Result<(), DomainError>;

    /// Removes an intent. Used when session creation fails, so a
    /// half-built intent can never correlate a webhook.
    async fn delete(&self, intent_id: IntentId) -> Result<(), DomainError>;

    /// Most recent unexpired intent for a processor customer, if any.
    async fn find_latest_unexpired_by_customer(
        &self,
        customer_id: &str,
        now: Timestamp,
    ) -> Result<Option<CheckoutIntent>, DomainError>;

    /// Deletes intents that expired before `now`. Returns rows removed.
    async fn purge_expired(&self, now: Timestamp) -> Result<u64, DomainError>;
}
