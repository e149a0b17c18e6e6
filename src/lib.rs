//! Billing Engine - Subscription Billing Reconciliation
//!
//! Keeps per-account paid-plan entitlements consistent with the state held
//! by an external payment processor, reconciling a synchronous checkout flow
//! and an asynchronous, at-least-once webhook stream into one authoritative,
//! idempotent transition log.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
