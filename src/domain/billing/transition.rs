//! Pure transition core.
//!
//! `decide` takes the current entitlement and a decoded event and
//! returns what should happen, without touching storage or emitting
//! anything itself. All lifecycle policy lives here so it can be tested
//! exhaustively without infrastructure.
//!
//! Ordering rule: every applied event moves the sequence watermark
//! forward, including applications that change nothing. Events behind
//! the watermark are discarded as stale, except `subscription.created`,
//! whose validity is governed solely by the current status being `none`.
//! Together these make any delivery order of the same event set converge
//! on the same final state.

use super::entitlement::AccountEntitlement;
use super::plan::{BillingCycle, PlanId};
use super::provider_event::{BillingEvent, CreatedStatus, ProviderStatus};
use super::status::SubscriptionStatus;
use crate::domain::foundation::{AccountId, StateMachine, Timestamp};

/// Field changes to persist against the entitlement. `None` fields are
/// left untouched; the watermark always advances to at least `sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementUpdate {
    pub status: Option<SubscriptionStatus>,
    pub plan: Option<(PlanId, BillingCycle)>,
    pub current_period_end: Option<Timestamp>,
    pub external_subscription_id: Option<String>,
    pub external_customer_id: Option<String>,
    pub sequence: i64,
}

impl EntitlementUpdate {
    /// A watermark-only update: nothing changes except the sequence
    /// high-water mark and the reconciled-event pointer.
    fn watermark(sequence: i64) -> Self {
        Self {
            status: None,
            plan: None,
            current_period_end: None,
            external_subscription_id: None,
            external_customer_id: None,
            sequence,
        }
    }
}

/// What the reconciler should do with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Persist the update. `status_changed` controls whether a
    /// transition record is appended.
    Apply {
        update: EntitlementUpdate,
        status_changed: bool,
    },

    /// Record in the ledger and do nothing else.
    Discard { reason: String },

    /// Record in the ledger and park for manual review.
    FlagForReview { reason: String },
}

/// Outcome of deciding an event against an entitlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionDecision {
    pub disposition: Disposition,
    pub notifications: Vec<BillingNotification>,
}

impl TransitionDecision {
    fn discard(reason: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::Discard {
                reason: reason.into(),
            },
            notifications: Vec::new(),
        }
    }

    fn flag(reason: impl Into<String>) -> Self {
        Self {
            disposition: Disposition::FlagForReview {
                reason: reason.into(),
            },
            notifications: Vec::new(),
        }
    }
}

/// Notification requests produced by applied transitions. Dispatch is
/// best-effort and happens after the entitlement write commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingNotification {
    Welcome {
        account_id: AccountId,
        plan: PlanId,
    },
    PlanChanged {
        account_id: AccountId,
        plan: PlanId,
        cycle: BillingCycle,
    },
    PaymentReceived {
        account_id: AccountId,
    },
    PaymentFailed {
        account_id: AccountId,
    },
    SubscriptionCanceled {
        account_id: AccountId,
    },
}

/// Decides the effect of `event` on `entitlement`.
pub fn decide(entitlement: &AccountEntitlement, event: &BillingEvent) -> TransitionDecision {
    match event {
        BillingEvent::SubscriptionCreated {
            subscription_id,
            customer_id,
            initial_status,
            plan,
            current_period_end,
            sequence,
            ..
        } => {
            if entitlement.status != SubscriptionStatus::None {
                return TransitionDecision::discard(format!(
                    "subscription already initialized (status {})",
                    entitlement.status.as_str()
                ));
            }
            let status = match initial_status {
                CreatedStatus::Active => SubscriptionStatus::Active,
                CreatedStatus::Trialing => SubscriptionStatus::Trialing,
            };
            let plan_id = plan.map(|(p, _)| p).unwrap_or(PlanId::Pro);
            // Payloads may omit the period end; fall back to a nominal
            // period measured from the event's own clock.
            let period_end = current_period_end.map(Timestamp::from_unix_secs).or_else(|| {
                plan.map(|(_, cycle)| {
                    Timestamp::from_unix_secs(*sequence + cycle.period_days() * 86_400)
                })
            });
            TransitionDecision {
                disposition: Disposition::Apply {
                    update: EntitlementUpdate {
                        status: Some(status),
                        plan: *plan,
                        current_period_end: period_end,
                        external_subscription_id: Some(subscription_id.clone()),
                        external_customer_id: Some(customer_id.clone()),
                        sequence: *sequence,
                    },
                    status_changed: true,
                },
                notifications: vec![BillingNotification::Welcome {
                    account_id: entitlement.account_id,
                    plan: plan_id,
                }],
            }
        }

        BillingEvent::SubscriptionUpdated {
            status,
            plan,
            current_period_end,
            sequence,
            ..
        } => {
            if entitlement.is_stale_sequence(*sequence) {
                return TransitionDecision::discard(stale_reason(entitlement, *sequence));
            }
            let target = match status {
                ProviderStatus::Trialing => SubscriptionStatus::Trialing,
                ProviderStatus::Active => SubscriptionStatus::Active,
                ProviderStatus::PastDue => SubscriptionStatus::PastDue,
                ProviderStatus::Canceled => SubscriptionStatus::Canceled,
                ProviderStatus::Unrecognized(raw) => {
                    return TransitionDecision::flag(format!(
                        "unrecognized provider status '{}'",
                        raw
                    ));
                }
            };

            let mut update = EntitlementUpdate {
                status: None,
                plan: *plan,
                current_period_end: current_period_end.map(Timestamp::from_unix_secs),
                external_subscription_id: None,
                external_customer_id: None,
                sequence: *sequence,
            };
            let mut notifications = Vec::new();

            let status_changed = if target == entitlement.status {
                false
            } else if entitlement.status.can_transition_to(&target) {
                update.status = Some(target);
                if target == SubscriptionStatus::Canceled {
                    notifications.push(BillingNotification::SubscriptionCanceled {
                        account_id: entitlement.account_id,
                    });
                }
                true
            } else if entitlement.status.is_terminal() {
                return TransitionDecision::discard(
                    "entitlement is canceled; update has no effect",
                );
            } else {
                return TransitionDecision::flag(format!(
                    "invalid transition {} -> {}",
                    entitlement.status.as_str(),
                    target.as_str()
                ));
            };

            if let Some((new_plan, new_cycle)) = plan {
                let plan_changed = entitlement.plan_id != *new_plan
                    || entitlement.billing_cycle != Some(*new_cycle);
                if plan_changed && entitlement.status != SubscriptionStatus::None {
                    notifications.push(BillingNotification::PlanChanged {
                        account_id: entitlement.account_id,
                        plan: *new_plan,
                        cycle: *new_cycle,
                    });
                }
            }

            TransitionDecision {
                disposition: Disposition::Apply {
                    update,
                    status_changed,
                },
                notifications,
            }
        }

        BillingEvent::SubscriptionDeleted { sequence, .. } => {
            if entitlement.is_stale_sequence(*sequence) {
                return TransitionDecision::discard(stale_reason(entitlement, *sequence));
            }
            if entitlement.status == SubscriptionStatus::Canceled {
                return TransitionDecision {
                    disposition: Disposition::Apply {
                        update: EntitlementUpdate::watermark(*sequence),
                        status_changed: false,
                    },
                    notifications: Vec::new(),
                };
            }
            let mut update = EntitlementUpdate::watermark(*sequence);
            update.status = Some(SubscriptionStatus::Canceled);
            TransitionDecision {
                disposition: Disposition::Apply {
                    update,
                    status_changed: true,
                },
                notifications: vec![BillingNotification::SubscriptionCanceled {
                    account_id: entitlement.account_id,
                }],
            }
        }

        BillingEvent::PaymentSucceeded { sequence, .. } => {
            if entitlement.is_stale_sequence(*sequence) {
                return TransitionDecision::discard(stale_reason(entitlement, *sequence));
            }
            match entitlement.status {
                // Recovery from the dunning window.
                SubscriptionStatus::PastDue => {
                    let mut update = EntitlementUpdate::watermark(*sequence);
                    update.status = Some(SubscriptionStatus::Active);
                    TransitionDecision {
                        disposition: Disposition::Apply {
                            update,
                            status_changed: true,
                        },
                        notifications: vec![BillingNotification::PaymentReceived {
                            account_id: entitlement.account_id,
                        }],
                    }
                }
                // Renewal in a healthy state: no change, but the
                // watermark still advances. Receipts only go out for
                // dunning recovery.
                SubscriptionStatus::Active | SubscriptionStatus::Trialing => TransitionDecision {
                    disposition: Disposition::Apply {
                        update: EntitlementUpdate::watermark(*sequence),
                        status_changed: false,
                    },
                    notifications: Vec::new(),
                },
                // Canceled or not-yet-created: ledger-accepted, no
                // state change, no notification.
                SubscriptionStatus::Canceled | SubscriptionStatus::None => TransitionDecision {
                    disposition: Disposition::Apply {
                        update: EntitlementUpdate::watermark(*sequence),
                        status_changed: false,
                    },
                    notifications: Vec::new(),
                },
            }
        }

        BillingEvent::PaymentFailed { sequence, .. } => {
            if entitlement.is_stale_sequence(*sequence) {
                return TransitionDecision::discard(stale_reason(entitlement, *sequence));
            }
            match entitlement.status {
                SubscriptionStatus::Active | SubscriptionStatus::Trialing => {
                    let mut update = EntitlementUpdate::watermark(*sequence);
                    update.status = Some(SubscriptionStatus::PastDue);
                    TransitionDecision {
                        disposition: Disposition::Apply {
                            update,
                            status_changed: true,
                        },
                        notifications: vec![BillingNotification::PaymentFailed {
                            account_id: entitlement.account_id,
                        }],
                    }
                }
                SubscriptionStatus::PastDue => TransitionDecision {
                    disposition: Disposition::Apply {
                        update: EntitlementUpdate::watermark(*sequence),
                        status_changed: false,
                    },
                    notifications: Vec::new(),
                },
                SubscriptionStatus::Canceled | SubscriptionStatus::None => TransitionDecision {
                    disposition: Disposition::Apply {
                        update: EntitlementUpdate::watermark(*sequence),
                        status_changed: false,
                    },
                    notifications: Vec::new(),
                },
            }
        }

        BillingEvent::Unknown { event_type } => {
            TransitionDecision::discard(format!("unhandled event type '{}'", event_type))
        }
    }
}

fn stale_reason(entitlement: &AccountEntitlement, sequence: i64) -> String {
    format!(
        "stale event: sequence {} behind watermark {}",
        sequence, entitlement.last_provider_sequence
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::EventId;

    fn fresh() -> AccountEntitlement {
        AccountEntitlement::provisioned(AccountId::new())
    }

    fn active() -> AccountEntitlement {
        let mut e = fresh();
        e.status = SubscriptionStatus::Active;
        e.plan_id = PlanId::Pro;
        e.billing_cycle = Some(BillingCycle::Monthly);
        e.external_subscription_id = Some("sub_1".to_string());
        e.external_customer_id = Some("cus_1".to_string());
        e.last_provider_sequence = 10;
        e
    }

    fn created_event(sequence: i64) -> BillingEvent {
        BillingEvent::SubscriptionCreated {
            subscription_id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            initial_status: CreatedStatus::Active,
            plan: Some((PlanId::Pro, BillingCycle::Monthly)),
            current_period_end: Some(1_706_745_600),
            account_id: None,
            sequence,
        }
    }

    fn updated_event(status: ProviderStatus, sequence: i64) -> BillingEvent {
        BillingEvent::SubscriptionUpdated {
            subscription_id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            status,
            plan: None,
            current_period_end: None,
            account_id: None,
            sequence,
        }
    }

    fn payment_succeeded(sequence: i64) -> BillingEvent {
        BillingEvent::PaymentSucceeded {
            subscription_id: Some("sub_1".to_string()),
            customer_id: "cus_1".to_string(),
            sequence,
        }
    }

    fn payment_failed(sequence: i64) -> BillingEvent {
        BillingEvent::PaymentFailed {
            subscription_id: Some("sub_1".to_string()),
            customer_id: "cus_1".to_string(),
            sequence,
        }
    }

    fn apply_decision(entitlement: &mut AccountEntitlement, decision: &TransitionDecision, n: u64) {
        if let Disposition::Apply { update, .. } = &decision.disposition {
            let event_id = EventId::new(format!("evt_{}", n)).unwrap();
            entitlement.apply(update, &event_id);
        }
    }

    #[test]
    fn created_initializes_a_fresh_entitlement() {
        let mut e = fresh();
        let decision = decide(&e, &created_event(1));

        match &decision.disposition {
            Disposition::Apply { status_changed, .. } => assert!(*status_changed),
            other => panic!("expected apply, got {:?}", other),
        }
        assert!(matches!(
            decision.notifications[..],
            [BillingNotification::Welcome { .. }]
        ));

        apply_decision(&mut e, &decision, 1);
        assert_eq!(e.status, SubscriptionStatus::Active);
        assert_eq!(e.plan_id, PlanId::Pro);
        assert_eq!(e.external_subscription_id.as_deref(), Some("sub_1"));
    }

    #[test]
    fn created_without_period_end_gets_nominal_period() {
        let e = fresh();
        let event = BillingEvent::SubscriptionCreated {
            subscription_id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            initial_status: CreatedStatus::Active,
            plan: Some((PlanId::Pro, BillingCycle::Monthly)),
            current_period_end: None,
            account_id: None,
            sequence: 1_704_067_200,
        };

        let decision = decide(&e, &event);
        match &decision.disposition {
            Disposition::Apply { update, .. } => assert_eq!(
                update.current_period_end,
                Some(Timestamp::from_unix_secs(1_704_067_200 + 30 * 86_400)),
            ),
            other => panic!("expected apply, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_created_is_discarded() {
        let e = active();
        let decision = decide(&e, &created_event(11));
        assert!(matches!(decision.disposition, Disposition::Discard { .. }));
    }

    #[test]
    fn payment_failed_moves_active_to_past_due() {
        let mut e = active();
        let decision = decide(&e, &payment_failed(11));

        apply_decision(&mut e, &decision, 11);
        assert_eq!(e.status, SubscriptionStatus::PastDue);
        assert!(e.has_paid_access()); // grace period
        assert!(matches!(
            decision.notifications[..],
            [BillingNotification::PaymentFailed { .. }]
        ));
    }

    #[test]
    fn payment_succeeded_recovers_past_due() {
        let mut e = active();
        e.status = SubscriptionStatus::PastDue;
        let decision = decide(&e, &payment_succeeded(11));

        apply_decision(&mut e, &decision, 11);
        assert_eq!(e.status, SubscriptionStatus::Active);
    }

    #[test]
    fn renewal_payment_applies_without_state_change() {
        let mut e = active();
        let decision = decide(&e, &payment_succeeded(11));

        match &decision.disposition {
            Disposition::Apply { status_changed, .. } => assert!(!*status_changed),
            other => panic!("expected apply, got {:?}", other),
        }
        apply_decision(&mut e, &decision, 11);
        assert_eq!(e.status, SubscriptionStatus::Active);
        assert_eq!(e.last_provider_sequence, 11);
    }

    #[test]
    fn stale_events_are_discarded() {
        let e = active(); // watermark 10
        for event in [
            payment_succeeded(9),
            payment_failed(9),
            updated_event(ProviderStatus::PastDue, 9),
            BillingEvent::SubscriptionDeleted {
                subscription_id: "sub_1".to_string(),
                customer_id: "cus_1".to_string(),
                account_id: None,
                sequence: 9,
            },
        ] {
            let decision = decide(&e, &event);
            assert!(
                matches!(decision.disposition, Disposition::Discard { .. }),
                "sequence 9 should be stale for {:?}",
                event
            );
        }
    }

    #[test]
    fn deleted_cancels_and_notifies() {
        let mut e = active();
        let decision = decide(
            &e,
            &BillingEvent::SubscriptionDeleted {
                subscription_id: "sub_1".to_string(),
                customer_id: "cus_1".to_string(),
                account_id: None,
                sequence: 11,
            },
        );

        apply_decision(&mut e, &decision, 11);
        assert_eq!(e.status, SubscriptionStatus::Canceled);
        assert!(!e.has_paid_access());
        assert!(matches!(
            decision.notifications[..],
            [BillingNotification::SubscriptionCanceled { .. }]
        ));
    }

    #[test]
    fn post_cancel_payment_is_accepted_without_change_or_notification() {
        let mut e = active();
        e.status = SubscriptionStatus::Canceled;
        let decision = decide(&e, &payment_succeeded(11));

        match &decision.disposition {
            Disposition::Apply { status_changed, .. } => assert!(!*status_changed),
            other => panic!("expected apply, got {:?}", other),
        }
        assert!(decision.notifications.is_empty());

        apply_decision(&mut e, &decision, 11);
        assert_eq!(e.status, SubscriptionStatus::Canceled);
    }

    #[test]
    fn unrecognized_status_is_flagged_not_applied() {
        let e = active();
        let decision = decide(
            &e,
            &updated_event(ProviderStatus::Unrecognized("paused".to_string()), 11),
        );
        assert!(matches!(
            decision.disposition,
            Disposition::FlagForReview { .. }
        ));
    }

    #[test]
    fn update_to_same_status_still_advances_watermark() {
        let mut e = active();
        let decision = decide(&e, &updated_event(ProviderStatus::Active, 15));

        match &decision.disposition {
            Disposition::Apply { status_changed, .. } => assert!(!*status_changed),
            other => panic!("expected apply, got {:?}", other),
        }
        apply_decision(&mut e, &decision, 15);
        assert_eq!(e.last_provider_sequence, 15);
    }

    #[test]
    fn plan_change_emits_notification() {
        let e = active(); // pro monthly
        let decision = decide(
            &e,
            &BillingEvent::SubscriptionUpdated {
                subscription_id: "sub_1".to_string(),
                customer_id: "cus_1".to_string(),
                status: ProviderStatus::Active,
                plan: Some((PlanId::Pro, BillingCycle::Yearly)),
                current_period_end: None,
                account_id: None,
                sequence: 11,
            },
        );

        assert!(matches!(
            decision.notifications[..],
            [BillingNotification::PlanChanged {
                cycle: BillingCycle::Yearly,
                ..
            }]
        ));
    }

    #[test]
    fn update_on_terminal_entitlement_is_discarded() {
        let mut e = active();
        e.status = SubscriptionStatus::Canceled;
        let decision = decide(&e, &updated_event(ProviderStatus::Active, 11));
        assert!(matches!(decision.disposition, Disposition::Discard { .. }));
    }

    #[test]
    fn unknown_event_type_is_discarded() {
        let e = active();
        let decision = decide(
            &e,
            &BillingEvent::Unknown {
                event_type: "charge.refunded".to_string(),
            },
        );
        assert!(matches!(decision.disposition, Disposition::Discard { .. }));
    }

    mod ordering_properties {
        use super::*;
        use proptest::prelude::*;

        // A richer event set: any permutation must land on the state the
        // in-order delivery produces.
        fn event_set() -> Vec<BillingEvent> {
            vec![
                created_event(1),
                payment_succeeded(2),
                payment_failed(3),
                updated_event(ProviderStatus::PastDue, 4),
                payment_succeeded(5),
            ]
        }

        fn replay(order: &[usize]) -> SubscriptionStatus {
            let mut e = fresh();
            let events = event_set();
            for (n, idx) in order.iter().enumerate() {
                let decision = decide(&e, &events[*idx]);
                apply_decision(&mut e, &decision, n as u64);
            }
            e.status
        }

        proptest! {
            #[test]
            fn shuffled_delivery_matches_in_order_result(
                order in Just((0..5usize).collect::<Vec<_>>()).prop_shuffle()
            ) {
                let expected = replay(&[0, 1, 2, 3, 4]);
                prop_assert_eq!(replay(&order), expected);
            }
        }
    }

    // Any delivery order of {created seq 1, payment_failed seq 2,
    // payment_succeeded seq 3} must land on active.
    #[test]
    fn out_of_order_delivery_converges() {
        let events = [created_event(1), payment_failed(2), payment_succeeded(3)];
        let orders: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for order in orders {
            let mut e = fresh();
            for (n, idx) in order.iter().enumerate() {
                let decision = decide(&e, &events[*idx]);
                apply_decision(&mut e, &decision, n as u64);
            }
            assert_eq!(
                e.status,
                SubscriptionStatus::Active,
                "order {:?} did not converge",
                order
            );
        }
    }
}
