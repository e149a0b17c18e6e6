//! Billing domain: entitlements, provider events, and the reconciliation
//! state machine.

mod checkout_intent;
mod entitlement;
mod errors;
mod plan;
mod provider_event;
mod signature;
mod status;
mod transition;
mod webhook_errors;

pub use checkout_intent::{CheckoutIntent, INTENT_TTL_MINUTES};
pub use entitlement::AccountEntitlement;
pub use errors::CheckoutError;
pub use plan::{BillingCycle, PlanCatalog, PlanId};
pub use provider_event::{BillingEvent, CreatedStatus, ProviderEvent, ProviderStatus};
pub use signature::{SignatureHeader, WebhookVerifier};
pub use status::SubscriptionStatus;
pub use transition::{decide, BillingNotification, Disposition, EntitlementUpdate, TransitionDecision};
pub use webhook_errors::ReconcileError;
