//! Configuration, loaded from the environment with the `BILLING__`
//! prefix (e.g. `BILLING__SERVER__PORT=8080`).

mod database;
mod error;
mod payment;
mod server;

pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use payment::PaymentConfig;
pub use server::ServerConfig;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payment: PaymentConfig,
    #[serde(default = "default_ledger_retention_days")]
    pub ledger_retention_days: i64,
}

fn default_ledger_retention_days() -> i64 {
    crate::application::DEFAULT_LEDGER_RETENTION_DAYS
}

impl AppConfig {
    /// Loads configuration from a `.env` file (if present) and the
    /// process environment, then validates it.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("BILLING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = settings.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Startup validation: every gap here must surface before traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.payment.validate()?;
        if self.ledger_retention_days <= 0 {
            return Err(ConfigError::Invalid(
                "ledger_retention_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: SecretString::new("postgres://localhost/billing".to_string()),
                max_connections: 5,
            },
            payment: PaymentConfig {
                secret_key: SecretString::new("sk_test_123".to_string()),
                webhook_secret: SecretString::new("whsec_123".to_string()),
                success_url: "https://app.example.com/billing/success".to_string(),
                cancel_url: "https://app.example.com/billing/cancel".to_string(),
                price_pro_monthly: "price_m".to_string(),
                price_pro_yearly: "price_y".to_string(),
            },
            ledger_retention_days: 90,
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn missing_price_id_fails_validation() {
        let mut config = valid_config();
        config.payment.price_pro_yearly = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_retention_fails_validation() {
        let mut config = valid_config();
        config.ledger_retention_days = 0;
        assert!(config.validate().is_err());
    }
}
