//! In-memory port implementations for tests and local development.

mod stores;

pub use stores::{
    InMemoryCheckoutIntentStore, InMemoryDeadLetterQueue, InMemoryEntitlementStore,
    InMemoryEventLedger, InMemoryTransitionLog, RecordingNotifier,
};
