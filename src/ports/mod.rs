//! Ports: interfaces the application layer depends on, implemented by
//! adapters.

mod checkout_intent_store;
mod dead_letter;
mod entitlement_store;
mod event_ledger;
mod notifier;
mod payment_provider;
mod transition_log;

pub use checkout_intent_store::CheckoutIntentStore;
pub use dead_letter::{DeadLetterEntry, DeadLetterQueue};
pub use entitlement_store::{EntitlementStore, UpdateOutcome};
pub use event_ledger::{EventLedger, LedgerEntry, RecordOutcome, ReconcileOutcome};
pub use notifier::NotificationDispatcher;
pub use payment_provider::{CheckoutSession, PaymentError, PaymentProvider};
pub use transition_log::{TransitionLog, TransitionRecord};
