//! Postgres dead-letter queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use super::db_err;
use crate::domain::foundation::{DomainError, EventId, Timestamp};
use crate::ports::{DeadLetterEntry, DeadLetterQueue};

pub struct PostgresDeadLetterQueue {
    pool: PgPool,
}

impl PostgresDeadLetterQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn entry_from_row(row: &PgRow) -> Result<DeadLetterEntry, DomainError> {
    let event_id: String = row.try_get("event_id").map_err(db_err)?;
    let event_type: String = row.try_get("event_type").map_err(db_err)?;
    let payload: serde_json::Value = row.try_get("payload").map_err(db_err)?;
    let reason: String = row.try_get("reason").map_err(db_err)?;
    let parked_at: DateTime<Utc> = row.try_get("parked_at").map_err(db_err)?;

    Ok(DeadLetterEntry {
        event_id: EventId::new(event_id)?,
        event_type,
        payload,
        reason,
        parked_at: Timestamp::from_datetime(parked_at),
    })
}

#[async_trait]
impl DeadLetterQueue for PostgresDeadLetterQueue {
    async fn park(&self, entry: &DeadLetterEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO billing_dead_letters
                (event_id, event_type, payload, reason, parked_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.event_id.as_str())
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(&entry.reason)
        .bind(entry.parked_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list(&self, limit: u32) -> Result<Vec<DeadLetterEntry>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type, payload, reason, parked_at
            FROM billing_dead_letters
            ORDER BY parked_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(entry_from_row).collect()
    }
}
