//! Checkout session initiation.
//!
//! Creates the correlation intent before calling the provider, so that
//! by the time the processor can possibly emit a webhook the intent is
//! already queryable. If session creation fails the intent is removed;
//! a half-built intent must never correlate a webhook.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::billing::{
    BillingCycle, CheckoutError, CheckoutIntent, PlanCatalog, PlanId,
};
use crate::domain::foundation::{AccountId, IntentId, Timestamp};
use crate::ports::{CheckoutIntentStore, EntitlementStore, PaymentProvider};

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub account_id: AccountId,
    pub plan_id: PlanId,
    pub billing_cycle: BillingCycle,
    /// Caller-chosen redirect after a completed checkout. The provider
    /// adapter falls back to its configured URL when absent.
    pub success_url: Option<String>,
    /// Caller-chosen redirect after an abandoned checkout.
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutResponse {
    pub intent_id: IntentId,
    pub session_id: String,
    pub url: String,
}

pub struct CheckoutInitiator {
    entitlements: Arc<dyn EntitlementStore>,
    intents: Arc<dyn CheckoutIntentStore>,
    provider: Arc<dyn PaymentProvider>,
    catalog: PlanCatalog,
}

impl CheckoutInitiator {
    pub fn new(
        entitlements: Arc<dyn EntitlementStore>,
        intents: Arc<dyn CheckoutIntentStore>,
        provider: Arc<dyn PaymentProvider>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            entitlements,
            intents,
            provider,
            catalog,
        }
    }

    pub async fn execute(&self, request: CheckoutRequest) -> Result<CheckoutResponse, CheckoutError> {
        let price_id = self
            .catalog
            .price_for(request.plan_id, request.billing_cycle)?
            .to_string();

        let entitlement = self
            .entitlements
            .get(request.account_id)
            .await?
            .ok_or(CheckoutError::AccountNotFound)?;

        // Reuse the bound processor customer when one exists.
        let customer_id = match entitlement.external_customer_id {
            Some(customer_id) => customer_id,
            None => self.provider.create_customer(request.account_id).await?,
        };

        let intent = CheckoutIntent::new(
            request.account_id,
            request.plan_id,
            request.billing_cycle,
            customer_id.clone(),
            Timestamp::now(),
        );
        self.intents.create(&intent).await?;

        match self
            .provider
            .create_checkout_session(
                &customer_id,
                &price_id,
                request.account_id,
                request.success_url.as_deref(),
                request.cancel_url.as_deref(),
            )
            .await
        {
            Ok(session) => {
                self.intents
                    .set_session(intent.intent_id, &session.session_id)
                    .await?;
                info!(
                    account_id = %request.account_id,
                    intent_id = %intent.intent_id,
                    plan = request.plan_id.as_str(),
                    cycle = request.billing_cycle.as_str(),
                    "checkout session created"
                );
                Ok(CheckoutResponse {
                    intent_id: intent.intent_id,
                    session_id: session.session_id,
                    url: session.url,
                })
            }
            Err(err) => {
                if let Err(cleanup_err) = self.intents.delete(intent.intent_id).await {
                    warn!(
                        intent_id = %intent.intent_id,
                        error = %cleanup_err,
                        "failed to remove intent after session creation failure"
                    );
                }
                Err(err.into())
            }
        }
    }
}
