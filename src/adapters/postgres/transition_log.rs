//! Postgres transition log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::db_err;
use crate::domain::billing::SubscriptionStatus;
use crate::domain::foundation::{AccountId, DomainError, EventId, Timestamp};
use crate::ports::{TransitionLog, TransitionRecord};

pub struct PostgresTransitionLog {
    pool: PgPool,
}

impl PostgresTransitionLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<TransitionRecord, DomainError> {
    let account_id: Uuid = row.try_get("account_id").map_err(db_err)?;
    let event_id: String = row.try_get("event_id").map_err(db_err)?;
    let from_status: String = row.try_get("from_status").map_err(db_err)?;
    let to_status: String = row.try_get("to_status").map_err(db_err)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(db_err)?;

    let parse_status = |s: &str| {
        SubscriptionStatus::parse(s)
            .ok_or_else(|| DomainError::database(format!("unknown status '{}'", s)))
    };

    Ok(TransitionRecord {
        account_id: AccountId::from_uuid(account_id),
        event_id: EventId::new(event_id)?,
        from_status: parse_status(&from_status)?,
        to_status: parse_status(&to_status)?,
        occurred_at: Timestamp::from_datetime(occurred_at),
    })
}

#[async_trait]
impl TransitionLog for PostgresTransitionLog {
    async fn append(&self, record: &TransitionRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO entitlement_transitions
                (account_id, event_id, from_status, to_status, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.account_id.as_uuid())
        .bind(record.event_id.as_str())
        .bind(record.from_status.as_str())
        .bind(record.to_status.as_str())
        .bind(record.occurred_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransitionRecord>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, event_id, from_status, to_status, occurred_at
            FROM entitlement_transitions
            WHERE account_id = $1
            ORDER BY occurred_at DESC, id DESC
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(record_from_row).collect()
    }
}
