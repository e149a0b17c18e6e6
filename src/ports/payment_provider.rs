//! Payment provider port.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::billing::CheckoutError;
use crate::domain::foundation::AccountId;

/// A hosted checkout session created at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    /// The provider could not be reached or returned a server error.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider rejected the request; retrying will not help.
    #[error("Provider rejected request: {0}")]
    Rejected(String),
}

impl From<PaymentError> for CheckoutError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Unavailable(msg) => CheckoutError::ProviderUnavailable(msg),
            PaymentError::Rejected(msg) => CheckoutError::ProviderUnavailable(msg),
        }
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a processor customer tagged with the account id.
    async fn create_customer(&self, account_id: AccountId) -> Result<String, PaymentError>;

    /// Creates a hosted checkout session for an existing customer and
    /// price, carrying the account id in the subscription metadata.
    /// Caller-supplied redirect URLs override the adapter's configured
    /// defaults when present.
    async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        account_id: AccountId,
        success_url: Option<&str>,
        cancel_url: Option<&str>,
    ) -> Result<CheckoutSession, PaymentError>;
}
