//! Entitlement read path.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{BillingCycle, PlanId, SubscriptionStatus};
use crate::domain::foundation::{AccountId, DomainError, Timestamp};
use crate::ports::EntitlementStore;

/// Read model served to callers checking an account's access.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementView {
    pub account_id: AccountId,
    pub plan_id: PlanId,
    pub billing_cycle: Option<BillingCycle>,
    pub status: SubscriptionStatus,
    pub has_paid_access: bool,
    pub current_period_end: Option<Timestamp>,
}

pub struct GetEntitlement {
    entitlements: Arc<dyn EntitlementStore>,
}

impl GetEntitlement {
    pub fn new(entitlements: Arc<dyn EntitlementStore>) -> Self {
        Self { entitlements }
    }

    pub async fn execute(
        &self,
        account_id: AccountId,
    ) -> Result<Option<EntitlementView>, DomainError> {
        Ok(self.entitlements.get(account_id).await?.map(|entitlement| {
            EntitlementView {
                account_id: entitlement.account_id,
                plan_id: entitlement.plan_id,
                billing_cycle: entitlement.billing_cycle,
                status: entitlement.status,
                has_paid_access: entitlement.has_paid_access(),
                current_period_end: entitlement.current_period_end,
            }
        }))
    }
}
