//! Webhook reconciliation orchestration.
//!
//! Pipeline: verify signature over the raw bytes, record in the event
//! ledger (idempotency gate), decode once, resolve the account, run the
//! pure transition core, persist with optimistic concurrency, then emit
//! audit records and notifications. A success response is only possible
//! after the ledger write has committed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::billing::{
    decide, BillingEvent, Disposition, PlanCatalog, ProviderEvent, ReconcileError,
    WebhookVerifier,
};
use crate::domain::billing::AccountEntitlement;
use crate::domain::foundation::Timestamp;
use crate::ports::{
    CheckoutIntentStore, DeadLetterEntry, DeadLetterQueue, EntitlementStore, EventLedger,
    LedgerEntry, NotificationDispatcher, RecordOutcome, ReconcileOutcome, TransitionLog,
    TransitionRecord, UpdateOutcome,
};

/// Version-conflict retries before the event is parked.
pub const MAX_CONFLICT_RETRIES: u32 = 3;

const RETRY_BASE_DELAY_MS: u64 = 25;

/// How an acknowledged webhook was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    /// The event was applied to an entitlement.
    Processed,
    /// The event id was already in the ledger; nothing re-ran.
    Duplicate,
    /// The event was recorded and deliberately not applied (unknown
    /// type or stale/invalid for the current state).
    Ignored,
}

pub struct Reconciler {
    verifier: WebhookVerifier,
    catalog: PlanCatalog,
    ledger: Arc<dyn EventLedger>,
    entitlements: Arc<dyn EntitlementStore>,
    intents: Arc<dyn CheckoutIntentStore>,
    transitions: Arc<dyn TransitionLog>,
    dead_letters: Arc<dyn DeadLetterQueue>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        verifier: WebhookVerifier,
        catalog: PlanCatalog,
        ledger: Arc<dyn EventLedger>,
        entitlements: Arc<dyn EntitlementStore>,
        intents: Arc<dyn CheckoutIntentStore>,
        transitions: Arc<dyn TransitionLog>,
        dead_letters: Arc<dyn DeadLetterQueue>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            verifier,
            catalog,
            ledger,
            entitlements,
            intents,
            transitions,
            dead_letters,
            notifier,
        }
    }

    /// Full webhook path: authenticity, idempotency, reconciliation.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<WebhookAck, ReconcileError> {
        self.verifier
            .verify(raw_body, signature_header, Timestamp::now())?;

        let event = ProviderEvent::from_raw(raw_body)?;

        let entry = LedgerEntry::received(
            event.event_id.clone(),
            event.event_type.clone(),
            event.occurred_at,
            event.payload.clone(),
        );
        if self.ledger.record_if_new(&entry).await? == RecordOutcome::AlreadyProcessed {
            debug!(event_id = %event.event_id, "duplicate delivery, skipping");
            return Ok(WebhookAck::Duplicate);
        }

        self.reconcile(&event).await
    }

    /// Replays ledger entries that were recorded but never reconciled,
    /// e.g. after a crash between the ledger write and the apply.
    pub async fn recover_incomplete(&self, limit: u32) -> Result<u32, ReconcileError> {
        let pending = self.ledger.find_unreconciled(limit).await?;
        let mut recovered = 0;

        for entry in pending {
            let event = ProviderEvent {
                event_id: entry.event_id.clone(),
                event_type: entry.event_type.clone(),
                occurred_at: entry.occurred_at,
                payload: entry.payload.clone(),
            };
            match self.reconcile(&event).await {
                Ok(_) => recovered += 1,
                // Parked entries are terminal too; count and continue.
                Err(ReconcileError::DeadLettered(_))
                | Err(ReconcileError::ConflictExhausted { .. }) => recovered += 1,
                Err(err) => {
                    warn!(event_id = %entry.event_id, error = %err, "recovery attempt failed");
                }
            }
        }
        Ok(recovered)
    }

    async fn reconcile(&self, event: &ProviderEvent) -> Result<WebhookAck, ReconcileError> {
        let decoded = event.decode(&self.catalog)?;

        if let BillingEvent::Unknown { event_type } = &decoded {
            debug!(event_id = %event.event_id, event_type = %event_type, "unhandled event type, ignoring");
            self.ledger
                .mark_reconciled(&event.event_id, ReconcileOutcome::Discarded)
                .await?;
            return Ok(WebhookAck::Ignored);
        }

        let Some(entitlement) = self.resolve_account(&decoded).await? else {
            return self
                .park(event, "no account correlation for event".to_string())
                .await;
        };

        self.apply_with_retries(event, &decoded, entitlement).await
    }

    /// Account resolution, most authoritative source first: explicit
    /// account metadata, then the bound subscription, then the bound
    /// customer, then an unexpired checkout intent.
    async fn resolve_account(
        &self,
        event: &BillingEvent,
    ) -> Result<Option<AccountEntitlement>, ReconcileError> {
        if let Some(account_id) = event.account_id() {
            if let Some(entitlement) = self.entitlements.get(account_id).await? {
                return Ok(Some(entitlement));
            }
        }

        if let Some(subscription_id) = event.subscription_id() {
            if let Some(entitlement) = self
                .entitlements
                .find_by_subscription(subscription_id)
                .await?
            {
                return Ok(Some(entitlement));
            }
        }

        if let Some(customer_id) = event.customer_id() {
            if let Some(entitlement) = self.entitlements.find_by_customer(customer_id).await? {
                return Ok(Some(entitlement));
            }
            if let Some(intent) = self
                .intents
                .find_latest_unexpired_by_customer(customer_id, Timestamp::now())
                .await?
            {
                if let Some(entitlement) = self.entitlements.get(intent.account_id).await? {
                    return Ok(Some(entitlement));
                }
            }
        }

        Ok(None)
    }

    async fn apply_with_retries(
        &self,
        event: &ProviderEvent,
        decoded: &BillingEvent,
        mut current: AccountEntitlement,
    ) -> Result<WebhookAck, ReconcileError> {
        for attempt in 0..MAX_CONFLICT_RETRIES {
            let decision = decide(&current, decoded);

            match decision.disposition {
                Disposition::Discard { reason } => {
                    info!(event_id = %event.event_id, reason = %reason, "event discarded");
                    self.ledger
                        .mark_reconciled(&event.event_id, ReconcileOutcome::Discarded)
                        .await?;
                    return Ok(WebhookAck::Ignored);
                }

                Disposition::FlagForReview { reason } => {
                    return self.park(event, reason).await;
                }

                Disposition::Apply {
                    update,
                    status_changed,
                } => {
                    let expected_version = current.version;
                    let mut next = current.clone();
                    next.apply(&update, &event.event_id);

                    match self.entitlements.update(&next, expected_version).await? {
                        UpdateOutcome::Applied => {
                            if status_changed {
                                self.transitions
                                    .append(&TransitionRecord {
                                        account_id: next.account_id,
                                        event_id: event.event_id.clone(),
                                        from_status: current.status,
                                        to_status: next.status,
                                        occurred_at: Timestamp::now(),
                                    })
                                    .await?;
                                info!(
                                    account_id = %next.account_id,
                                    event_id = %event.event_id,
                                    from = current.status.as_str(),
                                    to = next.status.as_str(),
                                    "entitlement transition applied"
                                );
                            }
                            self.ledger
                                .mark_reconciled(&event.event_id, ReconcileOutcome::Applied)
                                .await?;

                            if let BillingEvent::SubscriptionCreated { customer_id, .. } = decoded
                            {
                                self.discard_intent(customer_id).await;
                            }

                            // Best effort: the entitlement write has
                            // already committed.
                            for notification in &decision.notifications {
                                if let Err(err) = self.notifier.dispatch(notification).await {
                                    warn!(
                                        account_id = %next.account_id,
                                        error = %err,
                                        "notification dispatch failed"
                                    );
                                }
                            }
                            return Ok(WebhookAck::Processed);
                        }

                        UpdateOutcome::VersionConflict => {
                            debug!(
                                event_id = %event.event_id,
                                attempt,
                                "version conflict, re-reading entitlement"
                            );
                            tokio::time::sleep(Duration::from_millis(
                                RETRY_BASE_DELAY_MS << attempt,
                            ))
                            .await;
                            current = self
                                .entitlements
                                .get(current.account_id)
                                .await?
                                .ok_or_else(|| {
                                    ReconcileError::Storage(
                                        "entitlement disappeared during retry".to_string(),
                                    )
                                })?;
                        }
                    }
                }
            }
        }

        self.record_dead_letter(
            event,
            format!(
                "version conflict persisted after {} attempts",
                MAX_CONFLICT_RETRIES
            ),
        )
        .await?;
        Err(ReconcileError::ConflictExhausted {
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    /// A bound subscription supersedes intent-based correlation, so the
    /// consumed intent is dropped. Best effort; expiry cleanup covers
    /// anything missed here.
    async fn discard_intent(&self, customer_id: &str) {
        match self
            .intents
            .find_latest_unexpired_by_customer(customer_id, Timestamp::now())
            .await
        {
            Ok(Some(intent)) => {
                if let Err(err) = self.intents.delete(intent.intent_id).await {
                    warn!(
                        intent_id = %intent.intent_id,
                        error = %err,
                        "failed to discard consumed checkout intent"
                    );
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(customer_id, error = %err, "intent lookup failed during discard");
            }
        }
    }

    async fn park(
        &self,
        event: &ProviderEvent,
        reason: String,
    ) -> Result<WebhookAck, ReconcileError> {
        self.record_dead_letter(event, reason.clone()).await?;
        Err(ReconcileError::DeadLettered(reason))
    }

    async fn record_dead_letter(
        &self,
        event: &ProviderEvent,
        reason: String,
    ) -> Result<(), ReconcileError> {
        warn!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            reason = %reason,
            "parking event in dead-letter queue"
        );
        self.dead_letters
            .park(&DeadLetterEntry::new(
                event.event_id.clone(),
                event.event_type.clone(),
                event.payload.clone(),
                reason,
            ))
            .await?;
        self.ledger
            .mark_reconciled(&event.event_id, ReconcileOutcome::DeadLettered)
            .await?;
        Ok(())
    }
}
