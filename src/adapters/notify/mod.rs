//! Notification dispatch adapters.
//!
//! Production wiring currently logs notifications; a mail or push
//! adapter implements the same port without touching the reconciler.

use async_trait::async_trait;
use tracing::info;

use crate::domain::billing::BillingNotification;
use crate::domain::foundation::DomainError;
use crate::ports::NotificationDispatcher;

#[derive(Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationDispatcher for LoggingNotifier {
    async fn dispatch(&self, notification: &BillingNotification) -> Result<(), DomainError> {
        match notification {
            BillingNotification::Welcome { account_id, plan } => {
                info!(account_id = %account_id, plan = plan.as_str(), "notify: subscription started");
            }
            BillingNotification::PlanChanged {
                account_id,
                plan,
                cycle,
            } => {
                info!(
                    account_id = %account_id,
                    plan = plan.as_str(),
                    cycle = cycle.as_str(),
                    "notify: plan changed"
                );
            }
            BillingNotification::PaymentReceived { account_id } => {
                info!(account_id = %account_id, "notify: payment received");
            }
            BillingNotification::PaymentFailed { account_id } => {
                info!(account_id = %account_id, "notify: payment failed");
            }
            BillingNotification::SubscriptionCanceled { account_id } => {
                info!(account_id = %account_id, "notify: subscription canceled");
            }
        }
        Ok(())
    }
}
