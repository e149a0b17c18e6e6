//! Postgres entitlement store.
//!
//! `update` is the optimistic concurrency gate: the row is written only
//! when the stored version still matches what the caller read, and
//! `rows_affected` distinguishes the winner from the loser.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::db_err;
use crate::domain::billing::{AccountEntitlement, BillingCycle, PlanId, SubscriptionStatus};
use crate::domain::foundation::{AccountId, DomainError, EventId, Timestamp};
use crate::ports::{EntitlementStore, UpdateOutcome};

pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        sql: &str,
        bind: &str,
    ) -> Result<Option<AccountEntitlement>, DomainError> {
        let row = sqlx::query(sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(entitlement_from_row).transpose()
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT account_id, plan_id, billing_cycle, status, current_period_end,
           external_subscription_id, external_customer_id,
           last_reconciled_event_id, last_provider_sequence, version
    FROM account_entitlements
"#;

fn entitlement_from_row(row: &PgRow) -> Result<AccountEntitlement, DomainError> {
    let account_id: Uuid = row.try_get("account_id").map_err(db_err)?;
    let plan_id: String = row.try_get("plan_id").map_err(db_err)?;
    let billing_cycle: Option<String> = row.try_get("billing_cycle").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    let current_period_end: Option<DateTime<Utc>> =
        row.try_get("current_period_end").map_err(db_err)?;
    let external_subscription_id: Option<String> =
        row.try_get("external_subscription_id").map_err(db_err)?;
    let external_customer_id: Option<String> =
        row.try_get("external_customer_id").map_err(db_err)?;
    let last_reconciled_event_id: Option<String> =
        row.try_get("last_reconciled_event_id").map_err(db_err)?;
    let last_provider_sequence: i64 = row.try_get("last_provider_sequence").map_err(db_err)?;
    let version: i64 = row.try_get("version").map_err(db_err)?;

    Ok(AccountEntitlement {
        account_id: AccountId::from_uuid(account_id),
        plan_id: PlanId::parse(&plan_id)
            .ok_or_else(|| DomainError::database(format!("unknown plan_id '{}'", plan_id)))?,
        billing_cycle: billing_cycle
            .as_deref()
            .map(|c| {
                BillingCycle::parse(c).ok_or_else(|| {
                    DomainError::database(format!("unknown billing_cycle '{}'", c))
                })
            })
            .transpose()?,
        status: SubscriptionStatus::parse(&status)
            .ok_or_else(|| DomainError::database(format!("unknown status '{}'", status)))?,
        current_period_end: current_period_end.map(Timestamp::from_datetime),
        external_subscription_id,
        external_customer_id,
        last_reconciled_event_id: last_reconciled_event_id.map(EventId::new).transpose()?,
        last_provider_sequence,
        version,
    })
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn get(&self, account_id: AccountId) -> Result<Option<AccountEntitlement>, DomainError> {
        let sql = format!("{} WHERE account_id = $1", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(account_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(entitlement_from_row).transpose()
    }

    async fn create(&self, entitlement: &AccountEntitlement) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO account_entitlements
                (account_id, plan_id, billing_cycle, status, current_period_end,
                 external_subscription_id, external_customer_id,
                 last_reconciled_event_id, last_provider_sequence, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entitlement.account_id.as_uuid())
        .bind(entitlement.plan_id.as_str())
        .bind(entitlement.billing_cycle.map(|c| c.as_str()))
        .bind(entitlement.status.as_str())
        .bind(entitlement.current_period_end.map(|t| *t.as_datetime()))
        .bind(entitlement.external_subscription_id.as_deref())
        .bind(entitlement.external_customer_id.as_deref())
        .bind(
            entitlement
                .last_reconciled_event_id
                .as_ref()
                .map(|e| e.as_str()),
        )
        .bind(entitlement.last_provider_sequence)
        .bind(entitlement.version)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update(
        &self,
        entitlement: &AccountEntitlement,
        expected_version: i64,
    ) -> Result<UpdateOutcome, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE account_entitlements
            SET plan_id = $2,
                billing_cycle = $3,
                status = $4,
                current_period_end = $5,
                external_subscription_id = $6,
                external_customer_id = $7,
                last_reconciled_event_id = $8,
                last_provider_sequence = $9,
                version = $10,
                updated_at = now()
            WHERE account_id = $1 AND version = $11
            "#,
        )
        .bind(entitlement.account_id.as_uuid())
        .bind(entitlement.plan_id.as_str())
        .bind(entitlement.billing_cycle.map(|c| c.as_str()))
        .bind(entitlement.status.as_str())
        .bind(entitlement.current_period_end.map(|t| *t.as_datetime()))
        .bind(entitlement.external_subscription_id.as_deref())
        .bind(entitlement.external_customer_id.as_deref())
        .bind(
            entitlement
                .last_reconciled_event_id
                .as_ref()
                .map(|e| e.as_str()),
        )
        .bind(entitlement.last_provider_sequence)
        .bind(entitlement.version)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            Ok(UpdateOutcome::Applied)
        } else {
            Ok(UpdateOutcome::VersionConflict)
        }
    }

    async fn find_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<AccountEntitlement>, DomainError> {
        let sql = format!("{} WHERE external_subscription_id = $1", SELECT_COLUMNS);
        self.fetch_one_where(&sql, subscription_id).await
    }

    async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<AccountEntitlement>, DomainError> {
        let sql = format!("{} WHERE external_customer_id = $1", SELECT_COLUMNS);
        self.fetch_one_where(&sql, customer_id).await
    }
}
