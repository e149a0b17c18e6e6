//! Postgres implementations of the storage ports.

mod checkout_intent_store;
mod dead_letter;
mod entitlement_store;
mod event_ledger;
mod transition_log;

pub use checkout_intent_store::PostgresCheckoutIntentStore;
pub use dead_letter::PostgresDeadLetterQueue;
pub use entitlement_store::PostgresEntitlementStore;
pub use event_ledger::PostgresEventLedger;
pub use transition_log::PostgresTransitionLog;

use crate::domain::foundation::DomainError;

fn db_err(err: sqlx::Error) -> DomainError {
    DomainError::database(err.to_string())
}
