//! Foundation types shared across the billing domain.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{AccountId, EventId, IntentId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
