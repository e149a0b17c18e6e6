//! Notification dispatch port.

use async_trait::async_trait;

use crate::domain::billing::BillingNotification;
use crate::domain::foundation::DomainError;

/// Dispatches billing notifications to the account.
///
/// Dispatch is best-effort: the reconciler logs failures and moves on,
/// because the entitlement write has already committed.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &BillingNotification) -> Result<(), DomainError>;
}
