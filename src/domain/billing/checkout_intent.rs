//! Checkout intents.
//!
//! An intent is created before redirecting the account to the processor's
//! hosted checkout and carries the correlation the webhook path needs
//! when event metadata and subscription binding both fail to resolve an
//! account. Intents are ephemeral; expired ones are never used for
//! correlation.

use serde::{Deserialize, Serialize};

use super::plan::{BillingCycle, PlanId};
use crate::domain::foundation::{AccountId, IntentId, Timestamp};

/// How long an intent remains usable for correlation.
pub const INTENT_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutIntent {
    pub intent_id: IntentId,
    pub account_id: AccountId,
    pub plan_id: PlanId,
    pub billing_cycle: BillingCycle,

    /// Processor customer created (or reused) for this checkout.
    pub external_customer_id: String,

    /// Processor checkout session id, set once the session is created.
    pub external_session_id: Option<String>,

    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl CheckoutIntent {
    pub fn new(
        account_id: AccountId,
        plan_id: PlanId,
        billing_cycle: BillingCycle,
        external_customer_id: String,
        now: Timestamp,
    ) -> Self {
        Self {
            intent_id: IntentId::new(),
            account_id,
            plan_id,
            billing_cycle,
            external_customer_id,
            external_session_id: None,
            created_at: now,
            expires_at: now.add_minutes(INTENT_TTL_MINUTES),
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_before(&now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_expires_after_ttl() {
        let now = Timestamp::from_unix_secs(1_704_067_200);
        let intent = CheckoutIntent::new(
            AccountId::new(),
            PlanId::Pro,
            BillingCycle::Monthly,
            "cus_1".to_string(),
            now,
        );

        assert!(!intent.is_expired(now));
        assert!(!intent.is_expired(now.add_minutes(INTENT_TTL_MINUTES)));
        assert!(intent.is_expired(now.add_minutes(INTENT_TTL_MINUTES + 1)));
    }

    #[test]
    fn new_intent_has_no_session_yet() {
        let intent = CheckoutIntent::new(
            AccountId::new(),
            PlanId::Pro,
            BillingCycle::Yearly,
            "cus_1".to_string(),
            Timestamp::now(),
        );
        assert!(intent.external_session_id.is_none());
    }
}
