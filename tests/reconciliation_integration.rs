//! End-to-end reconciliation tests over the in-memory adapters: signed
//! webhook bodies go through the same verify/ledger/decide/apply path
//! the HTTP handler drives.

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;

use billing_engine::adapters::memory::{
    InMemoryCheckoutIntentStore, InMemoryDeadLetterQueue, InMemoryEntitlementStore,
    InMemoryEventLedger, InMemoryTransitionLog, RecordingNotifier,
};
use billing_engine::application::{Reconciler, WebhookAck};
use billing_engine::domain::billing::{
    AccountEntitlement, BillingCycle, BillingNotification, PlanCatalog, PlanId, ReconcileError,
    SubscriptionStatus, WebhookVerifier,
};
use billing_engine::domain::foundation::{AccountId, Timestamp};
use billing_engine::ports::{EntitlementStore, ReconcileOutcome};

const WEBHOOK_SECRET: &str = "whsec_integration_test";

struct Harness {
    reconciler: Arc<Reconciler>,
    verifier: WebhookVerifier,
    ledger: Arc<InMemoryEventLedger>,
    entitlements: Arc<InMemoryEntitlementStore>,
    intents: Arc<InMemoryCheckoutIntentStore>,
    transitions: Arc<InMemoryTransitionLog>,
    dead_letters: Arc<InMemoryDeadLetterQueue>,
    notifier: Arc<RecordingNotifier>,
}

fn catalog() -> PlanCatalog {
    let mut prices = HashMap::new();
    prices.insert(
        (PlanId::Pro, BillingCycle::Monthly),
        "price_pro_monthly".to_string(),
    );
    prices.insert(
        (PlanId::Pro, BillingCycle::Yearly),
        "price_pro_yearly".to_string(),
    );
    PlanCatalog::from_prices(prices).unwrap()
}

fn harness() -> Harness {
    let ledger = Arc::new(InMemoryEventLedger::new());
    let entitlements = Arc::new(InMemoryEntitlementStore::new());
    let intents = Arc::new(InMemoryCheckoutIntentStore::new());
    let transitions = Arc::new(InMemoryTransitionLog::new());
    let dead_letters = Arc::new(InMemoryDeadLetterQueue::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let verifier = WebhookVerifier::new(SecretString::new(WEBHOOK_SECRET.to_string()));

    let reconciler = Arc::new(Reconciler::new(
        verifier.clone(),
        catalog(),
        ledger.clone(),
        entitlements.clone(),
        intents.clone(),
        transitions.clone(),
        dead_letters.clone(),
        notifier.clone(),
    ));

    Harness {
        reconciler,
        verifier,
        ledger,
        entitlements,
        intents,
        transitions,
        dead_letters,
        notifier,
    }
}

fn event_body(event_id: &str, event_type: &str, sequence: i64, object: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": event_id,
        "type": event_type,
        "created": sequence,
        "data": { "object": object }
    }))
    .unwrap()
}

fn subscription_created(event_id: &str, sequence: i64, account_id: AccountId) -> Vec<u8> {
    event_body(
        event_id,
        "customer.subscription.created",
        sequence,
        json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "current_period_end": 1_706_745_600,
            "plan": { "id": "price_pro_monthly" },
            "metadata": { "account_id": account_id.to_string() }
        }),
    )
}

fn payment_event(event_id: &str, event_type: &str, sequence: i64) -> Vec<u8> {
    event_body(
        event_id,
        event_type,
        sequence,
        json!({ "customer": "cus_1", "subscription": "sub_1" }),
    )
}

impl Harness {
    async fn deliver(&self, body: &[u8]) -> Result<WebhookAck, ReconcileError> {
        let header = self
            .verifier
            .sign_for_test(body, Timestamp::now().as_unix_secs())
            .unwrap();
        self.reconciler.handle_webhook(body, &header).await
    }

    async fn provision(&self) -> AccountId {
        let account_id = AccountId::new();
        self.entitlements
            .create(&AccountEntitlement::provisioned(account_id))
            .await
            .unwrap();
        account_id
    }

    async fn status_of(&self, account_id: AccountId) -> SubscriptionStatus {
        self.entitlements
            .get(account_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

#[tokio::test]
async fn subscription_created_activates_account() {
    let h = harness();
    let account_id = h.provision().await;

    let ack = h
        .deliver(&subscription_created("evt_1", 1, account_id))
        .await
        .unwrap();

    assert_eq!(ack, WebhookAck::Processed);
    let entitlement = h.entitlements.get(account_id).await.unwrap().unwrap();
    assert_eq!(entitlement.status, SubscriptionStatus::Active);
    assert_eq!(entitlement.plan_id, PlanId::Pro);
    assert_eq!(entitlement.external_subscription_id.as_deref(), Some("sub_1"));
    assert_eq!(entitlement.external_customer_id.as_deref(), Some("cus_1"));
    assert_eq!(h.transitions.all().await.len(), 1);
    assert_eq!(h.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn duplicate_delivery_has_no_second_effect() {
    let h = harness();
    let account_id = h.provision().await;
    let body = subscription_created("evt_1", 1, account_id);

    assert_eq!(h.deliver(&body).await.unwrap(), WebhookAck::Processed);
    let version_after_first = h.entitlements.get(account_id).await.unwrap().unwrap().version;

    assert_eq!(h.deliver(&body).await.unwrap(), WebhookAck::Duplicate);

    let entitlement = h.entitlements.get(account_id).await.unwrap().unwrap();
    assert_eq!(entitlement.version, version_after_first);
    assert_eq!(h.transitions.all().await.len(), 1);
    assert_eq!(h.notifier.sent().await.len(), 1);
}

#[tokio::test]
async fn all_delivery_orders_converge_to_active() {
    let orders: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in orders {
        let h = harness();
        let account_id = h.provision().await;

        // Checkout precedes the webhook storm, so an intent exists to
        // correlate payment events that arrive before the subscription
        // binds.
        let intent = billing_engine::domain::billing::CheckoutIntent::new(
            account_id,
            PlanId::Pro,
            BillingCycle::Monthly,
            "cus_1".to_string(),
            Timestamp::now(),
        );
        {
            use billing_engine::ports::CheckoutIntentStore;
            h.intents.create(&intent).await.unwrap();
        }

        let bodies = [
            subscription_created("evt_created", 1, account_id),
            payment_event("evt_failed", "invoice.payment_failed", 2),
            payment_event("evt_succeeded", "invoice.payment_succeeded", 3),
        ];

        for idx in order {
            h.deliver(&bodies[idx]).await.unwrap();
        }

        assert_eq!(
            h.status_of(account_id).await,
            SubscriptionStatus::Active,
            "order {:?} did not converge",
            order
        );
    }
}

#[tokio::test]
async fn tampered_body_is_rejected_before_the_ledger() {
    let h = harness();
    let account_id = h.provision().await;
    let body = subscription_created("evt_1", 1, account_id);
    let header = h
        .verifier
        .sign_for_test(&body, Timestamp::now().as_unix_secs())
        .unwrap();

    let mut tampered = body.clone();
    let last = tampered.len() - 2;
    tampered[last] ^= 1;

    let result = h.reconciler.handle_webhook(&tampered, &header).await;
    assert!(matches!(result, Err(ReconcileError::InvalidSignature)));

    // Nothing recorded, nothing applied.
    let event_id = billing_engine::domain::foundation::EventId::new("evt_1").unwrap();
    assert!(h.ledger.entry(&event_id).await.is_none());
    assert_eq!(h.status_of(account_id).await, SubscriptionStatus::None);
}

#[tokio::test]
async fn stale_signature_timestamp_is_retryable_skew() {
    let h = harness();
    let account_id = h.provision().await;
    let body = subscription_created("evt_1", 1, account_id);
    let header = h
        .verifier
        .sign_for_test(&body, Timestamp::now().as_unix_secs() - 600)
        .unwrap();

    let result = h.reconciler.handle_webhook(&body, &header).await;
    match result {
        Err(err @ ReconcileError::ClockSkew(_)) => assert!(err.is_retryable()),
        other => panic!("expected clock skew, got {:?}", other),
    }
}

#[tokio::test]
async fn uncorrelatable_event_is_dead_lettered_and_acknowledged() {
    let h = harness();

    let body = event_body(
        "evt_orphan",
        "customer.subscription.updated",
        5,
        json!({ "id": "sub_unknown", "customer": "cus_unknown", "status": "active" }),
    );
    let result = h.deliver(&body).await;

    match result {
        Err(err @ ReconcileError::DeadLettered(_)) => {
            assert_eq!(err.status_code(), axum::http::StatusCode::OK);
        }
        other => panic!("expected dead-letter, got {:?}", other),
    }

    let parked = h.dead_letters.all().await;
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].event_id.as_str(), "evt_orphan");

    let event_id = billing_engine::domain::foundation::EventId::new("evt_orphan").unwrap();
    let entry = h.ledger.entry(&event_id).await.unwrap();
    assert_eq!(entry.outcome, Some(ReconcileOutcome::DeadLettered));
}

#[tokio::test]
async fn checkout_intent_correlates_events_without_metadata() {
    use billing_engine::domain::billing::CheckoutIntent;
    use billing_engine::ports::CheckoutIntentStore;

    let h = harness();
    let account_id = h.provision().await;

    let intent = CheckoutIntent::new(
        account_id,
        PlanId::Pro,
        BillingCycle::Monthly,
        "cus_1".to_string(),
        Timestamp::now(),
    );
    h.intents.create(&intent).await.unwrap();

    // Created event with no account metadata: resolution falls through
    // to the unexpired intent for cus_1.
    let body = event_body(
        "evt_1",
        "customer.subscription.created",
        1,
        json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "plan": { "id": "price_pro_monthly" }
        }),
    );
    assert_eq!(h.deliver(&body).await.unwrap(), WebhookAck::Processed);

    let entitlement = h.entitlements.get(account_id).await.unwrap().unwrap();
    assert_eq!(entitlement.status, SubscriptionStatus::Active);
    assert_eq!(entitlement.external_customer_id.as_deref(), Some("cus_1"));
}

#[tokio::test]
async fn subscription_binding_consumes_the_checkout_intent() {
    use billing_engine::domain::billing::CheckoutIntent;
    use billing_engine::ports::CheckoutIntentStore;

    let h = harness();
    let account_id = h.provision().await;

    let intent = CheckoutIntent::new(
        account_id,
        PlanId::Pro,
        BillingCycle::Monthly,
        "cus_1".to_string(),
        Timestamp::now(),
    );
    h.intents.create(&intent).await.unwrap();

    h.deliver(&subscription_created("evt_1", 1, account_id))
        .await
        .unwrap();

    // The subscription is bound; the correlation intent is spent.
    assert!(h
        .intents
        .find_latest_unexpired_by_customer("cus_1", Timestamp::now())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn trial_payment_failure_enters_dunning() {
    let h = harness();
    let account_id = h.provision().await;

    let trial = event_body(
        "evt_1",
        "customer.subscription.created",
        1,
        json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "trialing",
            "plan": { "id": "price_pro_monthly" },
            "metadata": { "account_id": account_id.to_string() }
        }),
    );
    h.deliver(&trial).await.unwrap();
    assert_eq!(h.status_of(account_id).await, SubscriptionStatus::Trialing);

    h.deliver(&payment_event("evt_2", "invoice.payment_failed", 2))
        .await
        .unwrap();

    assert_eq!(h.status_of(account_id).await, SubscriptionStatus::PastDue);
    let failure_notices = h
        .notifier
        .sent()
        .await
        .iter()
        .filter(|n| matches!(n, BillingNotification::PaymentFailed { .. }))
        .count();
    assert_eq!(failure_notices, 1);
}

#[tokio::test]
async fn dunning_cycle_past_due_then_recovery() {
    let h = harness();
    let account_id = h.provision().await;

    h.deliver(&subscription_created("evt_1", 1, account_id))
        .await
        .unwrap();
    h.deliver(&payment_event("evt_2", "invoice.payment_failed", 2))
        .await
        .unwrap();
    assert_eq!(h.status_of(account_id).await, SubscriptionStatus::PastDue);

    h.deliver(&payment_event("evt_3", "invoice.payment_succeeded", 3))
        .await
        .unwrap();
    assert_eq!(h.status_of(account_id).await, SubscriptionStatus::Active);

    // created -> past_due -> active
    assert_eq!(h.transitions.all().await.len(), 3);
}

#[tokio::test]
async fn post_cancel_payment_leaves_no_transition_record() {
    let h = harness();
    let account_id = h.provision().await;

    h.deliver(&subscription_created("evt_1", 1, account_id))
        .await
        .unwrap();
    let deleted = event_body(
        "evt_2",
        "customer.subscription.deleted",
        2,
        json!({ "id": "sub_1", "customer": "cus_1" }),
    );
    h.deliver(&deleted).await.unwrap();
    assert_eq!(h.status_of(account_id).await, SubscriptionStatus::Canceled);
    let transitions_after_cancel = h.transitions.all().await.len();

    let ack = h
        .deliver(&payment_event("evt_3", "invoice.payment_succeeded", 3))
        .await
        .unwrap();
    assert_eq!(ack, WebhookAck::Processed);
    assert_eq!(h.status_of(account_id).await, SubscriptionStatus::Canceled);
    assert_eq!(h.transitions.all().await.len(), transitions_after_cancel);

    let event_id = billing_engine::domain::foundation::EventId::new("evt_3").unwrap();
    assert_eq!(
        h.ledger.entry(&event_id).await.unwrap().outcome,
        Some(ReconcileOutcome::Applied)
    );
}

#[tokio::test]
async fn unrecognized_provider_status_is_parked_not_applied() {
    let h = harness();
    let account_id = h.provision().await;
    h.deliver(&subscription_created("evt_1", 1, account_id))
        .await
        .unwrap();

    let body = event_body(
        "evt_2",
        "customer.subscription.updated",
        2,
        json!({ "id": "sub_1", "customer": "cus_1", "status": "paused" }),
    );
    let result = h.deliver(&body).await;
    assert!(matches!(result, Err(ReconcileError::DeadLettered(_))));

    // Status untouched.
    assert_eq!(h.status_of(account_id).await, SubscriptionStatus::Active);
    assert_eq!(h.dead_letters.all().await.len(), 1);
}

#[tokio::test]
async fn unknown_event_types_are_acknowledged_and_ignored() {
    let h = harness();
    h.provision().await;

    let body = event_body("evt_1", "charge.refunded", 1, json!({ "id": "ch_1" }));
    assert_eq!(h.deliver(&body).await.unwrap(), WebhookAck::Ignored);

    let event_id = billing_engine::domain::foundation::EventId::new("evt_1").unwrap();
    assert_eq!(
        h.ledger.entry(&event_id).await.unwrap().outcome,
        Some(ReconcileOutcome::Discarded)
    );
}

#[tokio::test]
async fn concurrent_deliveries_of_the_same_event_apply_once() {
    let h = harness();
    let account_id = h.provision().await;
    let body = subscription_created("evt_1", 1, account_id);
    let header = h
        .verifier
        .sign_for_test(&body, Timestamp::now().as_unix_secs())
        .unwrap();

    let (first, second) = tokio::join!(
        h.reconciler.handle_webhook(&body, &header),
        h.reconciler.handle_webhook(&body, &header),
    );

    let acks = [first.unwrap(), second.unwrap()];
    assert!(acks.contains(&WebhookAck::Processed));
    assert!(acks.contains(&WebhookAck::Duplicate));
    assert_eq!(h.transitions.all().await.len(), 1);
}

#[tokio::test]
async fn concurrent_distinct_events_lose_no_update() {
    let h = harness();
    let account_id = h.provision().await;
    h.deliver(&subscription_created("evt_1", 1, account_id))
        .await
        .unwrap();

    // A payment failure and a period-end update race; optimistic
    // concurrency forces the loser to re-read and retry.
    let failed = payment_event("evt_2", "invoice.payment_failed", 2);
    let updated = event_body(
        "evt_3",
        "customer.subscription.updated",
        3,
        json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "past_due",
            "current_period_end": 1_709_424_000
        }),
    );

    let (a, b) = tokio::join!(h.deliver(&failed), h.deliver(&updated));
    a.unwrap();
    b.unwrap();

    let entitlement = h.entitlements.get(account_id).await.unwrap().unwrap();
    assert_eq!(entitlement.status, SubscriptionStatus::PastDue);
    // Both events applied: watermark reflects the later sequence.
    assert_eq!(entitlement.last_provider_sequence, 3);
}

#[tokio::test]
async fn recovery_replays_unreconciled_ledger_entries() {
    use billing_engine::domain::foundation::EventId;
    use billing_engine::ports::{EventLedger, LedgerEntry};

    let h = harness();
    let account_id = h.provision().await;

    // Simulate a crash after the ledger write: the entry exists but was
    // never reconciled.
    let entry = LedgerEntry::received(
        EventId::new("evt_1").unwrap(),
        "customer.subscription.created".to_string(),
        1,
        json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "plan": { "id": "price_pro_monthly" },
            "metadata": { "account_id": account_id.to_string() }
        }),
    );
    h.ledger.record_if_new(&entry).await.unwrap();

    let recovered = h.reconciler.recover_incomplete(10).await.unwrap();
    assert_eq!(recovered, 1);
    assert_eq!(h.status_of(account_id).await, SubscriptionStatus::Active);
}
