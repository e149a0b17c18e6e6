//! Stripe payment provider adapter.

mod provider;

pub use provider::{StripeConfig, StripeProvider};
