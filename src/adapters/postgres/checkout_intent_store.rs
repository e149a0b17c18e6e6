//! Postgres checkout intent store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::db_err;
use crate::domain::billing::{BillingCycle, CheckoutIntent, PlanId};
use crate::domain::foundation::{AccountId, DomainError, IntentId, Timestamp};
use crate::ports::CheckoutIntentStore;

pub struct PostgresCheckoutIntentStore {
    pool: PgPool,
}

impl PostgresCheckoutIntentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn intent_from_row(row: &PgRow) -> Result<CheckoutIntent, DomainError> {
    let intent_id: Uuid = row.try_get("intent_id").map_err(db_err)?;
    let account_id: Uuid = row.try_get("account_id").map_err(db_err)?;
    let plan_id: String = row.try_get("plan_id").map_err(db_err)?;
    let billing_cycle: String = row.try_get("billing_cycle").map_err(db_err)?;
    let external_customer_id: String = row.try_get("external_customer_id").map_err(db_err)?;
    let external_session_id: Option<String> =
        row.try_get("external_session_id").map_err(db_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;
    let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(db_err)?;

    Ok(CheckoutIntent {
        intent_id: IntentId::from_uuid(intent_id),
        account_id: AccountId::from_uuid(account_id),
        plan_id: PlanId::parse(&plan_id)
            .ok_or_else(|| DomainError::database(format!("unknown plan_id '{}'", plan_id)))?,
        billing_cycle: BillingCycle::parse(&billing_cycle).ok_or_else(|| {
            DomainError::database(format!("unknown billing_cycle '{}'", billing_cycle))
        })?,
        external_customer_id,
        external_session_id,
        created_at: Timestamp::from_datetime(created_at),
        expires_at: Timestamp::from_datetime(expires_at),
    })
}

#[async_trait]
impl CheckoutIntentStore for PostgresCheckoutIntentStore {
    async fn create(&self, intent: &CheckoutIntent) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO checkout_intents
                (intent_id, account_id, plan_id, billing_cycle,
                 external_customer_id, external_session_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(intent.intent_id.as_uuid())
        .bind(intent.account_id.as_uuid())
        .bind(intent.plan_id.as_str())
        .bind(intent.billing_cycle.as_str())
        .bind(&intent.external_customer_id)
        .bind(intent.external_session_id.as_deref())
        .bind(intent.created_at.as_datetime())
        .bind(intent.expires_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn set_session(&self, intent_id: IntentId, session_id: &str) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE checkout_intents
            SET external_session_id = $2
            WHERE intent_id = $1
            "#,
        )
        .bind(intent_id.as_uuid())
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete(&self, intent_id: IntentId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM checkout_intents WHERE intent_id = $1")
            .bind(intent_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn find_latest_unexpired_by_customer(
        &self,
        customer_id: &str,
        now: Timestamp,
    ) -> Result<Option<CheckoutIntent>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT intent_id, account_id, plan_id, billing_cycle,
                   external_customer_id, external_session_id, created_at, expires_at
            FROM checkout_intents
            WHERE external_customer_id = $1 AND expires_at >= $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(customer_id)
        .bind(now.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(intent_from_row).transpose()
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM checkout_intents WHERE expires_at < $1")
            .bind(now.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
