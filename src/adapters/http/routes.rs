//! Route table and shared state.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::application::{CheckoutInitiator, GetEntitlement, Reconciler};
use crate::ports::DeadLetterQueue;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub checkout: Arc<CheckoutInitiator>,
    pub entitlements: Arc<GetEntitlement>,
    pub dead_letters: Arc<dyn DeadLetterQueue>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhooks/stripe", post(handlers::stripe_webhook))
        .route("/billing/checkout", post(handlers::create_checkout))
        .route(
            "/billing/entitlement/:account_id",
            get(handlers::get_entitlement),
        )
        .route("/billing/dead-letters", get(handlers::list_dead_letters))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}
