//! Periodic housekeeping: ledger pruning and intent expiry.

use std::sync::Arc;

use tracing::info;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{CheckoutIntentStore, EventLedger};

/// Reconciled ledger entries older than this are pruned.
pub const DEFAULT_LEDGER_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub ledger_entries_pruned: u64,
    pub intents_purged: u64,
}

pub struct Maintenance {
    ledger: Arc<dyn EventLedger>,
    intents: Arc<dyn CheckoutIntentStore>,
    retention_days: i64,
}

impl Maintenance {
    pub fn new(
        ledger: Arc<dyn EventLedger>,
        intents: Arc<dyn CheckoutIntentStore>,
        retention_days: i64,
    ) -> Self {
        Self {
            ledger,
            intents,
            retention_days,
        }
    }

    pub async fn run_once(&self, now: Timestamp) -> Result<MaintenanceReport, DomainError> {
        let cutoff = now.minus_days(self.retention_days);
        let ledger_entries_pruned = self.ledger.prune_before(cutoff).await?;
        let intents_purged = self.intents.purge_expired(now).await?;

        if ledger_entries_pruned > 0 || intents_purged > 0 {
            info!(ledger_entries_pruned, intents_purged, "maintenance pass complete");
        }
        Ok(MaintenanceReport {
            ledger_entries_pruned,
            intents_purged,
        })
    }
}
