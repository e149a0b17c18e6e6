//! In-memory implementations of the storage and notification ports.
//!
//! Semantics mirror the Postgres adapters, including the ledger's
//! first-writer-wins insert and the entitlement store's version check,
//! so application code can be exercised without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::billing::{AccountEntitlement, BillingNotification, CheckoutIntent};
use crate::domain::foundation::{AccountId, DomainError, EventId, IntentId, Timestamp};
use crate::ports::{
    CheckoutIntentStore, DeadLetterEntry, DeadLetterQueue, EntitlementStore, EventLedger,
    LedgerEntry, NotificationDispatcher, RecordOutcome, ReconcileOutcome, TransitionLog,
    TransitionRecord, UpdateOutcome,
};

#[derive(Default)]
pub struct InMemoryEventLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl InMemoryEventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test accessor: a copy of the entry for an event id.
    pub async fn entry(&self, event_id: &EventId) -> Option<LedgerEntry> {
        self.entries.lock().await.get(event_id.as_str()).cloned()
    }
}

#[async_trait]
impl EventLedger for InMemoryEventLedger {
    async fn record_if_new(&self, entry: &LedgerEntry) -> Result<RecordOutcome, DomainError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(entry.event_id.as_str()) {
            return Ok(RecordOutcome::AlreadyProcessed);
        }
        entries.insert(entry.event_id.as_str().to_string(), entry.clone());
        Ok(RecordOutcome::Inserted)
    }

    async fn mark_reconciled(
        &self,
        event_id: &EventId,
        outcome: ReconcileOutcome,
    ) -> Result<(), DomainError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(event_id.as_str())
            .ok_or_else(|| DomainError::database("ledger entry not found"))?;
        entry.reconciled_at = Some(Timestamp::now());
        entry.outcome = Some(outcome);
        Ok(())
    }

    async fn find_unreconciled(&self, limit: u32) -> Result<Vec<LedgerEntry>, DomainError> {
        let entries = self.entries.lock().await;
        let mut pending: Vec<LedgerEntry> = entries
            .values()
            .filter(|e| e.reconciled_at.is_none())
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.received_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn prune_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.reconciled_at.is_none() || !e.received_at.is_before(&cutoff));
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryEntitlementStore {
    entitlements: Mutex<HashMap<AccountId, AccountEntitlement>>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn get(&self, account_id: AccountId) -> Result<Option<AccountEntitlement>, DomainError> {
        Ok(self.entitlements.lock().await.get(&account_id).cloned())
    }

    async fn create(&self, entitlement: &AccountEntitlement) -> Result<(), DomainError> {
        let mut entitlements = self.entitlements.lock().await;
        if entitlements.contains_key(&entitlement.account_id) {
            return Err(DomainError::database("entitlement already exists"));
        }
        entitlements.insert(entitlement.account_id, entitlement.clone());
        Ok(())
    }

    async fn update(
        &self,
        entitlement: &AccountEntitlement,
        expected_version: i64,
    ) -> Result<UpdateOutcome, DomainError> {
        let mut entitlements = self.entitlements.lock().await;
        match entitlements.get(&entitlement.account_id) {
            Some(stored) if stored.version == expected_version => {
                entitlements.insert(entitlement.account_id, entitlement.clone());
                Ok(UpdateOutcome::Applied)
            }
            Some(_) => Ok(UpdateOutcome::VersionConflict),
            None => Err(DomainError::database("entitlement not found")),
        }
    }

    async fn find_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<AccountEntitlement>, DomainError> {
        Ok(self
            .entitlements
            .lock()
            .await
            .values()
            .find(|e| e.external_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<AccountEntitlement>, DomainError> {
        Ok(self
            .entitlements
            .lock()
            .await
            .values()
            .find(|e| e.external_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryCheckoutIntentStore {
    intents: Mutex<HashMap<IntentId, CheckoutIntent>>,
}

impl InMemoryCheckoutIntentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckoutIntentStore for InMemoryCheckoutIntentStore {
    async fn create(&self, intent: &CheckoutIntent) -> Result<(), DomainError> {
        self.intents
            .lock()
            .await
            .insert(intent.intent_id, intent.clone());
        Ok(())
    }

    async fn set_session(&self, intent_id: IntentId, session_id: &str) -> Result<(), DomainError> {
        let mut intents = self.intents.lock().await;
        let intent = intents
            .get_mut(&intent_id)
            .ok_or_else(|| DomainError::database("intent not found"))?;
        intent.external_session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn delete(&self, intent_id: IntentId) -> Result<(), DomainError> {
        self.intents.lock().await.remove(&intent_id);
        Ok(())
    }

    async fn find_latest_unexpired_by_customer(
        &self,
        customer_id: &str,
        now: Timestamp,
    ) -> Result<Option<CheckoutIntent>, DomainError> {
        Ok(self
            .intents
            .lock()
            .await
            .values()
            .filter(|i| i.external_customer_id == customer_id && !i.is_expired(now))
            .max_by_key(|i| i.created_at)
            .cloned())
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, DomainError> {
        let mut intents = self.intents.lock().await;
        let before = intents.len();
        intents.retain(|_, i| !i.is_expired(now));
        Ok((before - intents.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryTransitionLog {
    records: Mutex<Vec<TransitionRecord>>,
}

impl InMemoryTransitionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test accessor: all records in append order.
    pub async fn all(&self) -> Vec<TransitionRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl TransitionLog for InMemoryTransitionLog {
    async fn append(&self, record: &TransitionRecord) -> Result<(), DomainError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransitionRecord>, DomainError> {
        let records = self.records.lock().await;
        let mut matching: Vec<TransitionRecord> = records
            .iter()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect();
        matching.reverse();
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryDeadLetterQueue {
    entries: Mutex<Vec<DeadLetterEntry>>,
}

impl InMemoryDeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl DeadLetterQueue for InMemoryDeadLetterQueue {
    async fn park(&self, entry: &DeadLetterEntry) -> Result<(), DomainError> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn list(&self, limit: u32) -> Result<Vec<DeadLetterEntry>, DomainError> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().rev().take(limit as usize).cloned().collect())
    }
}

/// Captures dispatched notifications for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<BillingNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<BillingNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn dispatch(&self, notification: &BillingNotification) -> Result<(), DomainError> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}
