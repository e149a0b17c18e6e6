//! Postgres event ledger.
//!
//! `record_if_new` relies on the primary key over `event_id` with
//! `ON CONFLICT DO NOTHING`: of any number of concurrent inserts for the
//! same event, exactly one reports a row written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

use super::db_err;
use crate::domain::foundation::{DomainError, EventId, Timestamp};
use crate::ports::{EventLedger, LedgerEntry, RecordOutcome, ReconcileOutcome};

pub struct PostgresEventLedger {
    pool: PgPool,
}

impl PostgresEventLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry, DomainError> {
    let event_id: String = row
        .try_get("event_id")
        .map_err(db_err)?;
    let event_type: String = row
        .try_get("event_type")
        .map_err(db_err)?;
    let occurred_at: i64 = row
        .try_get("occurred_at")
        .map_err(db_err)?;
    let payload: serde_json::Value = row
        .try_get("payload")
        .map_err(db_err)?;
    let received_at: DateTime<Utc> = row
        .try_get("received_at")
        .map_err(db_err)?;
    let reconciled_at: Option<DateTime<Utc>> = row
        .try_get("reconciled_at")
        .map_err(db_err)?;
    let outcome: Option<String> = row
        .try_get("outcome")
        .map_err(db_err)?;

    Ok(LedgerEntry {
        event_id: EventId::new(event_id)?,
        event_type,
        occurred_at,
        payload,
        received_at: Timestamp::from_datetime(received_at),
        reconciled_at: reconciled_at.map(Timestamp::from_datetime),
        outcome: outcome.as_deref().and_then(ReconcileOutcome::parse),
    })
}

#[async_trait]
impl EventLedger for PostgresEventLedger {
    async fn record_if_new(&self, entry: &LedgerEntry) -> Result<RecordOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_events
                (event_id, event_type, occurred_at, payload, received_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(entry.event_id.as_str())
        .bind(&entry.event_type)
        .bind(entry.occurred_at)
        .bind(&entry.payload)
        .bind(entry.received_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            Ok(RecordOutcome::Inserted)
        } else {
            Ok(RecordOutcome::AlreadyProcessed)
        }
    }

    async fn mark_reconciled(
        &self,
        event_id: &EventId,
        outcome: ReconcileOutcome,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE billing_events
            SET reconciled_at = now(), outcome = $2
            WHERE event_id = $1
            "#,
        )
        .bind(event_id.as_str())
        .bind(outcome.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_unreconciled(&self, limit: u32) -> Result<Vec<LedgerEntry>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type, occurred_at, payload,
                   received_at, reconciled_at, outcome
            FROM billing_events
            WHERE reconciled_at IS NULL
            ORDER BY received_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query(
            r#"
            DELETE FROM billing_events
            WHERE reconciled_at IS NOT NULL AND received_at < $1
            "#,
        )
        .bind(cutoff.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}
