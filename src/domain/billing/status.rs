//! Subscription status state machine.
//!
//! Defines all possible entitlement states and the valid transitions
//! between them. `Canceled` is terminal; cancellation is reachable from
//! any non-terminal state.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Current state of an account's subscription in the payment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// No subscription exists. Initial state at tenant provisioning.
    None,

    /// Subscription created with a trial period. Full access.
    Trialing,

    /// Fully paid subscription with complete access.
    Active,

    /// Payment failed but within the provider's retry window.
    PastDue,

    /// Subscription ended. Terminal; features revoked.
    Canceled,
}

impl SubscriptionStatus {
    /// Returns true if this status grants access to paid features.
    ///
    /// `PastDue` retains access during the payment retry grace period.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }

    /// Stable string form used in storage and wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Parses the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(SubscriptionStatus::None),
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From NONE
            (None, Trialing)
                | (None, Active)
                | (None, Canceled)
            // From TRIALING
                | (Trialing, Active)
                | (Trialing, PastDue)
                | (Trialing, Canceled)
            // From ACTIVE
                | (Active, PastDue)
                | (Active, Trialing) // provider-authoritative update
                | (Active, Canceled)
            // From PAST_DUE
                | (PastDue, Active)
                | (PastDue, Trialing) // provider-authoritative update
                | (PastDue, Canceled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            None => vec![Trialing, Active, Canceled],
            Trialing => vec![Active, PastDue, Canceled],
            Active => vec![PastDue, Trialing, Canceled],
            PastDue => vec![Active, Trialing, Canceled],
            Canceled => vec![],
        }
    }
}
