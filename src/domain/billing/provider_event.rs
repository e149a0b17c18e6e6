//! Provider event representation.
//!
//! `ProviderEvent` is the immutable event as received from the processor.
//! `BillingEvent` is the narrow internal representation the engine works
//! with, decoded exactly once at the boundary so the reconciliation core
//! never touches the external schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::plan::{BillingCycle, PlanCatalog, PlanId};
use super::webhook_errors::ReconcileError;
use crate::domain::foundation::{AccountId, EventId};

/// An inbound processor event, exactly as received.
///
/// Stored verbatim in the event ledger; `event_id` is the provider's
/// globally unique identifier and keys the ledger's uniqueness constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEvent {
    /// Provider-assigned unique identifier (e.g. `evt_...`).
    pub event_id: EventId,

    /// Provider event type string (e.g. `customer.subscription.updated`).
    pub event_type: String,

    /// Provider-side creation time (Unix seconds). Doubles as the
    /// ordering sequence for stale-event detection.
    pub occurred_at: i64,

    /// The event's data object, untouched.
    pub payload: serde_json::Value,
}

/// Wire envelope as delivered by the processor.
#[derive(Debug, Deserialize)]
struct WireEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: WireData,
}

#[derive(Debug, Deserialize)]
struct WireData {
    object: serde_json::Value,
}

impl ProviderEvent {
    /// Parses the raw webhook body into a `ProviderEvent`.
    ///
    /// Must be called on the exact bytes that passed signature
    /// verification; the payload is carried forward without re-encoding.
    pub fn from_raw(raw: &[u8]) -> Result<Self, ReconcileError> {
        let envelope: WireEnvelope = serde_json::from_slice(raw)
            .map_err(|e| ReconcileError::ParseError(e.to_string()))?;

        let event_id = EventId::new(envelope.id)
            .map_err(|e| ReconcileError::ParseError(e.to_string()))?;

        Ok(Self {
            event_id,
            event_type: envelope.event_type,
            occurred_at: envelope.created,
            payload: envelope.data.object,
        })
    }

    /// Decodes into the internal representation.
    ///
    /// Unknown event types decode to `BillingEvent::Unknown`; they are
    /// accepted and ignored because the provider's taxonomy evolves
    /// independently of this engine.
    pub fn decode(&self, catalog: &PlanCatalog) -> Result<BillingEvent, ReconcileError> {
        match self.event_type.as_str() {
            "subscription.created" | "customer.subscription.created" => {
                let obj = self.subscription_object()?;
                let initial_status = match obj.status.as_deref() {
                    Some("trialing") => CreatedStatus::Trialing,
                    _ => CreatedStatus::Active,
                };
                Ok(BillingEvent::SubscriptionCreated {
                    subscription_id: obj.id,
                    customer_id: obj.customer,
                    initial_status,
                    plan: obj.plan.and_then(|p| catalog.selection_for_price(&p.id)),
                    current_period_end: obj.current_period_end,
                    account_id: parse_account_metadata(&obj.metadata),
                    sequence: self.occurred_at,
                })
            }
            "subscription.updated" | "customer.subscription.updated" => {
                let obj = self.subscription_object()?;
                let status = match obj.status.as_deref() {
                    Some("trialing") => ProviderStatus::Trialing,
                    Some("active") => ProviderStatus::Active,
                    Some("past_due") => ProviderStatus::PastDue,
                    Some("canceled") => ProviderStatus::Canceled,
                    Some(other) => ProviderStatus::Unrecognized(other.to_string()),
                    None => ProviderStatus::Unrecognized(String::new()),
                };
                Ok(BillingEvent::SubscriptionUpdated {
                    subscription_id: obj.id,
                    customer_id: obj.customer,
                    status,
                    plan: obj.plan.and_then(|p| catalog.selection_for_price(&p.id)),
                    current_period_end: obj.current_period_end,
                    account_id: parse_account_metadata(&obj.metadata),
                    sequence: self.occurred_at,
                })
            }
            "subscription.deleted" | "customer.subscription.deleted" => {
                let obj = self.subscription_object()?;
                Ok(BillingEvent::SubscriptionDeleted {
                    subscription_id: obj.id,
                    customer_id: obj.customer,
                    account_id: parse_account_metadata(&obj.metadata),
                    sequence: self.occurred_at,
                })
            }
            "invoice.payment_succeeded" => {
                let obj = self.invoice_object()?;
                Ok(BillingEvent::PaymentSucceeded {
                    subscription_id: obj.subscription,
                    customer_id: obj.customer,
                    sequence: self.occurred_at,
                })
            }
            "invoice.payment_failed" => {
                let obj = self.invoice_object()?;
                Ok(BillingEvent::PaymentFailed {
                    subscription_id: obj.subscription,
                    customer_id: obj.customer,
                    sequence: self.occurred_at,
                })
            }
            other => Ok(BillingEvent::Unknown {
                event_type: other.to_string(),
            }),
        }
    }

    fn subscription_object(&self) -> Result<SubscriptionObject, ReconcileError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| ReconcileError::ParseError(format!("subscription object: {}", e)))
    }

    fn invoice_object(&self) -> Result<InvoiceObject, ReconcileError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| ReconcileError::ParseError(format!("invoice object: {}", e)))
    }
}

fn parse_account_metadata(metadata: &HashMap<String, String>) -> Option<AccountId> {
    metadata.get("account_id").and_then(|v| v.parse().ok())
}

/// Subscription fields the engine cares about; everything else ignored.
#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: String,
    status: Option<String>,
    current_period_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    plan: Option<PlanObject>,
}

#[derive(Debug, Deserialize)]
struct PlanObject {
    id: String,
}

/// Invoice fields the engine cares about.
#[derive(Debug, Deserialize)]
struct InvoiceObject {
    customer: String,
    subscription: Option<String>,
}

/// Initial status carried by a `subscription.created` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedStatus {
    Active,
    Trialing,
}

/// Status carried verbatim by a `subscription.updated` event.
///
/// `Unrecognized` captures status values this engine does not know;
/// policy is to leave the stored status unchanged and flag the event for
/// manual review rather than guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unrecognized(String),
}

/// Narrow, versioned internal event representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    SubscriptionCreated {
        subscription_id: String,
        customer_id: String,
        initial_status: CreatedStatus,
        plan: Option<(PlanId, BillingCycle)>,
        current_period_end: Option<i64>,
        account_id: Option<AccountId>,
        sequence: i64,
    },
    SubscriptionUpdated {
        subscription_id: String,
        customer_id: String,
        status: ProviderStatus,
        plan: Option<(PlanId, BillingCycle)>,
        current_period_end: Option<i64>,
        account_id: Option<AccountId>,
        sequence: i64,
    },
    SubscriptionDeleted {
        subscription_id: String,
        customer_id: String,
        account_id: Option<AccountId>,
        sequence: i64,
    },
    PaymentSucceeded {
        subscription_id: Option<String>,
        customer_id: String,
        sequence: i64,
    },
    PaymentFailed {
        subscription_id: Option<String>,
        customer_id: String,
        sequence: i64,
    },
    Unknown {
        event_type: String,
    },
}

impl BillingEvent {
    /// Subscription id carried by the event, if any.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            BillingEvent::SubscriptionCreated { subscription_id, .. }
            | BillingEvent::SubscriptionUpdated { subscription_id, .. }
            | BillingEvent::SubscriptionDeleted { subscription_id, .. } => Some(subscription_id),
            BillingEvent::PaymentSucceeded { subscription_id, .. }
            | BillingEvent::PaymentFailed { subscription_id, .. } => subscription_id.as_deref(),
            BillingEvent::Unknown { .. } => None,
        }
    }

    /// Customer id carried by the event, if any.
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            BillingEvent::SubscriptionCreated { customer_id, .. }
            | BillingEvent::SubscriptionUpdated { customer_id, .. }
            | BillingEvent::SubscriptionDeleted { customer_id, .. }
            | BillingEvent::PaymentSucceeded { customer_id, .. }
            | BillingEvent::PaymentFailed { customer_id, .. } => Some(customer_id),
            BillingEvent::Unknown { .. } => None,
        }
    }

    /// Direct account binding from event metadata, if present.
    pub fn account_id(&self) -> Option<AccountId> {
        match self {
            BillingEvent::SubscriptionCreated { account_id, .. }
            | BillingEvent::SubscriptionUpdated { account_id, .. }
            | BillingEvent::SubscriptionDeleted { account_id, .. } => *account_id,
            _ => None,
        }
    }

    /// Provider-side ordering sequence.
    pub fn sequence(&self) -> i64 {
        match self {
            BillingEvent::SubscriptionCreated { sequence, .. }
            | BillingEvent::SubscriptionUpdated { sequence, .. }
            | BillingEvent::SubscriptionDeleted { sequence, .. }
            | BillingEvent::PaymentSucceeded { sequence, .. }
            | BillingEvent::PaymentFailed { sequence, .. } => *sequence,
            BillingEvent::Unknown { .. } => 0,
        }
    }
}
