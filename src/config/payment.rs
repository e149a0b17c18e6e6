//! Payment processor settings.

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ConfigError;
use crate::domain::billing::{BillingCycle, PlanCatalog, PlanId};

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// API secret key (`sk_...`).
    pub secret_key: SecretString,

    /// Webhook signing secret (`whsec_...`).
    pub webhook_secret: SecretString,

    pub success_url: String,
    pub cancel_url: String,

    pub price_pro_monthly: String,
    pub price_pro_yearly: String,
}

impl PaymentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("payment.secret_key", self.secret_key.expose_secret()),
            ("payment.webhook_secret", self.webhook_secret.expose_secret()),
            ("payment.success_url", &self.success_url),
            ("payment.cancel_url", &self.cancel_url),
            ("payment.price_pro_monthly", &self.price_pro_monthly),
            ("payment.price_pro_yearly", &self.price_pro_yearly),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} is required", name)));
            }
        }
        Ok(())
    }

    /// Builds the plan catalog from the configured price identifiers.
    pub fn plan_catalog(&self) -> Result<PlanCatalog, ConfigError> {
        let mut prices = HashMap::new();
        prices.insert(
            (PlanId::Pro, BillingCycle::Monthly),
            self.price_pro_monthly.clone(),
        );
        prices.insert(
            (PlanId::Pro, BillingCycle::Yearly),
            self.price_pro_yearly.clone(),
        );
        PlanCatalog::from_prices(prices).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
