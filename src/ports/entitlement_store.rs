//! Entitlement store port.

use async_trait::async_trait;

use crate::domain::billing::AccountEntitlement;
use crate::domain::foundation::{AccountId, DomainError};

/// Result of a version-checked write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The write landed against the expected version.
    Applied,
    /// Another writer advanced the version first; re-read and retry.
    VersionConflict,
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Loads the entitlement for an account, including its version.
    async fn get(&self, account_id: AccountId) -> Result<Option<AccountEntitlement>, DomainError>;

    /// Inserts a fresh entitlement record (tenant provisioning).
    async fn create(&self, entitlement: &AccountEntitlement) -> Result<(), DomainError>;

    /// Writes the entitlement only if the stored version still equals
    /// `expected_version`. The entitlement's own `version` field must
    /// already be the incremented value.
    async fn update(
        &self,
        entitlement: &AccountEntitlement,
        expected_version: i64,
    ) -> Result<UpdateOutcome, DomainError>;

    /// Looks up by bound processor subscription id.
    async fn find_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<AccountEntitlement>, DomainError>;

    /// Looks up by bound processor customer id.
    async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<AccountEntitlement>, DomainError>;
}
