//! Account entitlement aggregate.
//!
//! One record per account, owned exclusively by the reconciliation path.
//! All fields reflect the payment processor's view as of the last applied
//! event; the `version` column backs optimistic concurrency control in
//! the store.

use serde::{Deserialize, Serialize};

use super::plan::{BillingCycle, PlanId};
use super::status::SubscriptionStatus;
use super::transition::EntitlementUpdate;
use crate::domain::foundation::{AccountId, EventId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntitlement {
    pub account_id: AccountId,

    /// Currently entitled plan. `Basic` until a paid subscription applies.
    pub plan_id: PlanId,

    /// Billing interval of the paid subscription, if any.
    pub billing_cycle: Option<BillingCycle>,

    pub status: SubscriptionStatus,

    /// End of the current paid period, as reported by the processor.
    pub current_period_end: Option<Timestamp>,

    /// Processor-side subscription identifier, bound on first apply.
    pub external_subscription_id: Option<String>,

    /// Processor-side customer identifier, bound on first apply.
    pub external_customer_id: Option<String>,

    /// Ledger id of the last event applied to this record.
    pub last_reconciled_event_id: Option<EventId>,

    /// High-water mark of applied provider sequences; events below it
    /// are stale and discarded.
    pub last_provider_sequence: i64,

    /// Optimistic concurrency version. Incremented on every applied
    /// update; the store rejects writes against a stale version.
    pub version: i64,
}

impl AccountEntitlement {
    /// Fresh entitlement for a newly provisioned account: free plan, no
    /// subscription.
    pub fn provisioned(account_id: AccountId) -> Self {
        Self {
            account_id,
            plan_id: PlanId::Basic,
            billing_cycle: None,
            status: SubscriptionStatus::None,
            current_period_end: None,
            external_subscription_id: None,
            external_customer_id: None,
            last_reconciled_event_id: None,
            last_provider_sequence: 0,
            version: 1,
        }
    }

    /// Returns true if the account currently has paid-feature access.
    pub fn has_paid_access(&self) -> bool {
        self.status.grants_access()
    }

    /// Returns true if an event with this sequence arrives out of order
    /// behind the high-water mark.
    pub fn is_stale_sequence(&self, sequence: i64) -> bool {
        sequence < self.last_provider_sequence
    }

    /// Applies a decided update in place.
    ///
    /// The sequence watermark only moves forward, so replays of already
    /// applied events cannot regress it. Mirrors the store-side write;
    /// used by in-memory adapters and tests.
    pub fn apply(&mut self, update: &EntitlementUpdate, event_id: &EventId) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some((plan, cycle)) = update.plan {
            self.plan_id = plan;
            self.billing_cycle = Some(cycle);
        }
        if let Some(period_end) = update.current_period_end {
            self.current_period_end = Some(period_end);
        }
        if let Some(subscription_id) = &update.external_subscription_id {
            self.external_subscription_id = Some(subscription_id.clone());
        }
        if let Some(customer_id) = &update.external_customer_id {
            self.external_customer_id = Some(customer_id.clone());
        }
        self.last_provider_sequence = self.last_provider_sequence.max(update.sequence);
        self.last_reconciled_event_id = Some(event_id.clone());
        self.version += 1;
    }
}
