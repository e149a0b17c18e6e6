//! HTTP surface: webhook endpoint, checkout, and entitlement queries.

mod dto;
mod handlers;
mod routes;

pub use routes::{router, AppState};
