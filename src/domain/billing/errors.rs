//! Checkout-side error types.
//!
//! These surface synchronously to the caller initiating a checkout; none
//! of them is auto-retried by the engine.

use axum::http::StatusCode;
use thiserror::Error;

use super::plan::{BillingCycle, PlanId};
use crate::domain::foundation::DomainError;

/// Errors from the Checkout Session Initiator.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The selected plan is not purchasable (free or unknown).
    #[error("Plan '{0:?}' cannot be purchased")]
    InvalidPlan(PlanId),

    /// The billing cycle is not configured for the selected plan.
    #[error("Billing cycle {cycle:?} is not available for plan {plan:?}")]
    InvalidBillingCycle { plan: PlanId, cycle: BillingCycle },

    /// No processor price identifier configured for this environment.
    ///
    /// Raised at startup by catalog validation, never mid-request.
    #[error("No price identifier configured for {plan:?}/{cycle:?}")]
    MissingConfiguration { plan: PlanId, cycle: BillingCycle },

    /// The account to check out does not exist.
    #[error("Account not found")]
    AccountNotFound,

    /// The payment processor could not be reached or returned a server
    /// error. Retryable by the caller.
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Local persistence failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl CheckoutError {
    /// Returns true if the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::ProviderUnavailable(_) | CheckoutError::Store(_)
        )
    }

    /// Maps the error to an HTTP status code for the checkout endpoint.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CheckoutError::InvalidPlan(_) | CheckoutError::InvalidBillingCycle { .. } => {
                StatusCode::BAD_REQUEST
            }
            CheckoutError::AccountNotFound => StatusCode::NOT_FOUND,
            CheckoutError::MissingConfiguration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CheckoutError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CheckoutError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CheckoutError::InvalidPlan(_) => "INVALID_PLAN",
            CheckoutError::InvalidBillingCycle { .. } => "INVALID_BILLING_CYCLE",
            CheckoutError::MissingConfiguration { .. } => "MISSING_CONFIGURATION",
            CheckoutError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            CheckoutError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            CheckoutError::Store(_) => "STORE_ERROR",
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        CheckoutError::Store(err.to_string())
    }
}
