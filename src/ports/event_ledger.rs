//! Event ledger port.
//!
//! The ledger is the idempotency backbone: one row per provider event id,
//! inserted before any side effect. The uniqueness constraint on the
//! event id is what makes concurrent duplicate deliveries safe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, EventId, Timestamp};

/// A provider event as recorded in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub event_id: EventId,
    pub event_type: String,
    /// Provider-side creation time (Unix seconds); preserved so an
    /// unreconciled entry can be replayed with its original sequence.
    pub occurred_at: i64,
    pub payload: serde_json::Value,
    pub received_at: Timestamp,
    pub reconciled_at: Option<Timestamp>,
    pub outcome: Option<ReconcileOutcome>,
}

impl LedgerEntry {
    pub fn received(
        event_id: EventId,
        event_type: String,
        occurred_at: i64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id,
            event_type,
            occurred_at,
            payload,
            received_at: Timestamp::now(),
            reconciled_at: None,
            outcome: None,
        }
    }
}

/// Result of attempting to record an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First delivery; processing may proceed.
    Inserted,
    /// The event id already exists; this delivery is a duplicate.
    AlreadyProcessed,
}

/// Terminal outcome of reconciling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied,
    Discarded,
    DeadLettered,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::Discarded => "discarded",
            ReconcileOutcome::DeadLettered => "dead_lettered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(ReconcileOutcome::Applied),
            "discarded" => Some(ReconcileOutcome::Discarded),
            "dead_lettered" => Some(ReconcileOutcome::DeadLettered),
            _ => None,
        }
    }
}

#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Records the event if its id has not been seen, atomically.
    ///
    /// Implementations must guarantee that exactly one of two concurrent
    /// calls with the same event id returns `Inserted`.
    async fn record_if_new(&self, entry: &LedgerEntry) -> Result<RecordOutcome, DomainError>;

    /// Marks an event as reconciled with its terminal outcome.
    async fn mark_reconciled(
        &self,
        event_id: &EventId,
        outcome: ReconcileOutcome,
    ) -> Result<(), DomainError>;

    /// Events recorded but never marked reconciled (crash recovery).
    async fn find_unreconciled(&self, limit: u32) -> Result<Vec<LedgerEntry>, DomainError>;

    /// Deletes reconciled entries received before the cutoff. Returns
    /// the number of rows removed.
    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}
