//! Application layer: use-case orchestration over the ports.

mod checkout;
mod get_entitlement;
mod maintenance;
mod reconciler;

pub use checkout::{CheckoutInitiator, CheckoutRequest, CheckoutResponse};
pub use get_entitlement::{EntitlementView, GetEntitlement};
pub use maintenance::{Maintenance, MaintenanceReport, DEFAULT_LEDGER_RETENTION_DAYS};
pub use reconciler::{Reconciler, WebhookAck, MAX_CONFLICT_RETRIES};
