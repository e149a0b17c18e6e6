//! Stripe HTTP client for the payment provider port.
//!
//! Only the two calls checkout needs: create a customer and create a
//! hosted checkout session. The account id travels in metadata on both
//! the customer and the subscription, which is what lets webhook events
//! resolve directly back to an account.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::domain::foundation::AccountId;
use crate::ports::{CheckoutSession, PaymentError, PaymentProvider};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub success_url: String,
    pub cancel_url: String,
    /// Overridable for tests against a local stub.
    pub api_base: String,
}

impl StripeConfig {
    pub fn new(secret_key: SecretString, success_url: String, cancel_url: String) -> Self {
        Self {
            secret_key,
            success_url,
            cancel_url,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

pub struct StripeProvider {
    client: Client,
    config: StripeConfig,
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, PaymentError> {
        let url = format!("{}{}", self.config.api_base, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| PaymentError::Unavailable(format!("malformed response: {}", e)))
        } else {
            let message = response
                .json::<ApiErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| format!("http {}", status));
            if status.is_server_error() {
                Err(PaymentError::Unavailable(message))
            } else {
                Err(PaymentError::Rejected(message))
            }
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_customer(&self, account_id: AccountId) -> Result<String, PaymentError> {
        let form = vec![(
            "metadata[account_id]".to_string(),
            account_id.to_string(),
        )];
        let customer: CustomerResponse = self.post_form("/v1/customers", &form).await?;
        debug!(account_id = %account_id, customer_id = %customer.id, "stripe customer created");
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        account_id: AccountId,
        success_url: Option<&str>,
        cancel_url: Option<&str>,
    ) -> Result<CheckoutSession, PaymentError> {
        let success_url = success_url.unwrap_or(&self.config.success_url);
        let cancel_url = cancel_url.unwrap_or(&self.config.cancel_url);
        let form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("customer".to_string(), customer_id.to_string()),
            ("line_items[0][price]".to_string(), price_id.to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "subscription_data[metadata][account_id]".to_string(),
                account_id.to_string(),
            ),
            ("success_url".to_string(), success_url.to_string()),
            ("cancel_url".to_string(), cancel_url.to_string()),
        ];
        let session: SessionResponse = self.post_form("/v1/checkout/sessions", &form).await?;
        debug!(customer_id, session_id = %session.id, "stripe checkout session created");
        Ok(CheckoutSession {
            session_id: session.id,
            url: session.url,
        })
    }
}
