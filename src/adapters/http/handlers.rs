//! HTTP handlers.
//!
//! The webhook handler passes the body through as raw bytes; signature
//! verification must see exactly what arrived on the wire, so no
//! extractor is allowed to parse it first.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};
use uuid::Uuid;

use super::dto::{
    CheckoutRequestDto, CheckoutResponseDto, DeadLetterDto, DeadLetterQuery, ErrorDto,
    WebhookAckDto,
};
use super::routes::AppState;
use crate::application::{CheckoutRequest, WebhookAck};
use crate::domain::billing::{BillingCycle, PlanId, ReconcileError};
use crate::domain::foundation::AccountId;

const SIGNATURE_HEADER: &str = "Stripe-Signature";

pub async fn health() -> &'static str {
    "ok"
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorDto::new("missing signature header", "MISSING_SIGNATURE")),
        )
            .into_response();
    };

    match state.reconciler.handle_webhook(&body, signature).await {
        Ok(ack) => {
            let status = match ack {
                WebhookAck::Processed => "processed",
                WebhookAck::Duplicate => "duplicate",
                WebhookAck::Ignored => "ignored",
            };
            (StatusCode::OK, Json(WebhookAckDto { status })).into_response()
        }
        Err(err) => {
            let status = err.status_code();
            // Parked events are durably recorded; the 200 tells the
            // provider to stop redelivering.
            if status == StatusCode::OK {
                warn!(error = %err, "event acknowledged but parked");
                return (status, Json(WebhookAckDto { status: "accepted" })).into_response();
            }
            match &err {
                ReconcileError::InvalidSignature => {
                    warn!("webhook rejected: invalid signature");
                }
                ReconcileError::Storage(_) => {
                    error!(error = %err, "webhook processing failed");
                }
                _ => {
                    warn!(error = %err, "webhook rejected");
                }
            }
            (status, Json(ErrorDto::new(err.to_string(), "WEBHOOK_ERROR"))).into_response()
        }
    }
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequestDto>,
) -> Response {
    let Some(plan_id) = PlanId::parse(&request.plan) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorDto::new(
                format!("unknown plan '{}'", request.plan),
                "INVALID_PLAN",
            )),
        )
            .into_response();
    };
    let Some(billing_cycle) = BillingCycle::parse(&request.billing_cycle) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorDto::new(
                format!("unknown billing cycle '{}'", request.billing_cycle),
                "INVALID_BILLING_CYCLE",
            )),
        )
            .into_response();
    };

    let checkout = CheckoutRequest {
        account_id: AccountId::from_uuid(request.account_id),
        plan_id,
        billing_cycle,
        success_url: request.success_url,
        cancel_url: request.cancel_url,
    };
    match state.checkout.execute(checkout).await {
        Ok(response) => (
            StatusCode::OK,
            Json(CheckoutResponseDto {
                intent_id: *response.intent_id.as_uuid(),
                session_id: response.session_id,
                url: response.url,
            }),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "checkout initiation failed");
            (
                err.status_code(),
                Json(ErrorDto::new(err.to_string(), err.error_code())),
            )
                .into_response()
        }
    }
}

pub async fn get_entitlement(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Response {
    match state
        .entitlements
        .execute(AccountId::from_uuid(account_id))
        .await
    {
        Ok(Some(view)) => (StatusCode::OK, Json(view)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorDto::new("account not found", "ACCOUNT_NOT_FOUND")),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "entitlement lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorDto::new("internal error", "INTERNAL_ERROR")),
            )
                .into_response()
        }
    }
}

pub async fn list_dead_letters(
    State(state): State<AppState>,
    Query(query): Query<DeadLetterQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50).min(500);
    match state.dead_letters.list(limit).await {
        Ok(entries) => {
            let dtos: Vec<DeadLetterDto> = entries
                .into_iter()
                .map(|e| DeadLetterDto {
                    event_id: e.event_id.as_str().to_string(),
                    event_type: e.event_type,
                    reason: e.reason,
                    parked_at: e.parked_at.as_unix_secs(),
                })
                .collect();
            (StatusCode::OK, Json(dtos)).into_response()
        }
        Err(err) => {
            error!(error = %err, "dead-letter listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorDto::new("internal error", "INTERNAL_ERROR")),
            )
                .into_response()
        }
    }
}
