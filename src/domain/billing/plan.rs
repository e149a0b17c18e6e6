//! Plan catalog: static configuration mapping plan selections to the
//! payment processor's price identifiers.
//!
//! The catalog of known plans is fixed at build time; the price identifiers
//! come from configuration and are validated at startup. A paid plan with a
//! missing price identifier is a configuration error, never a runtime one.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::errors::CheckoutError;

/// Identifier for a billing plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanId {
    /// Free plan. Never purchasable through checkout.
    Basic,
    /// Paid plan.
    Pro,
}

impl PlanId {
    /// Returns true if this plan is paid (purchasable through checkout).
    pub fn is_paid(&self) -> bool {
        matches!(self, PlanId::Pro)
    }

    /// Stable string form used in storage and wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Basic => "basic",
            PlanId::Pro => "pro",
        }
    }

    /// Parses the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "basic" => Some(PlanId::Basic),
            "pro" => Some(PlanId::Pro),
            _ => None,
        }
    }
}

/// Billing interval for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// Stable string form used in storage and wire payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    /// Parses the stable string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(BillingCycle::Monthly),
            "yearly" => Some(BillingCycle::Yearly),
            _ => None,
        }
    }

    /// Nominal period length in days, used only as a fallback when the
    /// provider event omits the period end.
    pub fn period_days(&self) -> i64 {
        match self {
            BillingCycle::Monthly => 30,
            BillingCycle::Yearly => 365,
        }
    }
}

/// The paid (plan, cycle) combinations the product sells.
static PAID_COMBINATIONS: Lazy<Vec<(PlanId, BillingCycle)>> = Lazy::new(|| {
    vec![
        (PlanId::Pro, BillingCycle::Monthly),
        (PlanId::Pro, BillingCycle::Yearly),
    ]
});

/// Catalog resolving (plan, cycle) selections to processor price ids.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    prices: HashMap<(PlanId, BillingCycle), String>,
}

impl PlanCatalog {
    /// Builds a catalog from configured price identifiers.
    ///
    /// Fails with `MissingConfiguration` if any paid combination lacks a
    /// price id. Call this at startup so the gap surfaces before traffic.
    pub fn from_prices(
        prices: HashMap<(PlanId, BillingCycle), String>,
    ) -> Result<Self, CheckoutError> {
        for (plan, cycle) in PAID_COMBINATIONS.iter() {
            if !prices.contains_key(&(*plan, *cycle)) {
                return Err(CheckoutError::MissingConfiguration {
                    plan: *plan,
                    cycle: *cycle,
                });
            }
        }
        Ok(Self { prices })
    }

    /// Validates a checkout selection and resolves its price identifier.
    ///
    /// A free plan is rejected as `InvalidPlan`; a paid plan with an
    /// unconfigured cycle is rejected as `InvalidBillingCycle`.
    pub fn price_for(&self, plan: PlanId, cycle: BillingCycle) -> Result<&str, CheckoutError> {
        if !plan.is_paid() {
            return Err(CheckoutError::InvalidPlan(plan));
        }
        self.prices
            .get(&(plan, cycle))
            .map(String::as_str)
            .ok_or(CheckoutError::InvalidBillingCycle { plan, cycle })
    }

    /// Reverse lookup: maps a processor price id back to a plan selection.
    ///
    /// Used when decoding provider events that carry only the price id.
    pub fn selection_for_price(&self, price_id: &str) -> Option<(PlanId, BillingCycle)> {
        self.prices
            .iter()
            .find(|(_, v)| v.as_str() == price_id)
            .map(|(k, _)| *k)
    }
}
