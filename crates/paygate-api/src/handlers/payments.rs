//! Payment command handlers
//!
//! Each handler builds a command, runs it under the request deadline,
//! and renders the outcome. Cancellation is by future drop: if the
//! deadline fires during the bank call, the payment is left in its
//! `*ING` state and the retry worker reconciles it.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;

use paygate_core::{
    AuthorizeCommand, CaptureCommand, CommandOutcome, RefundCommand, VoidCommand,
};
use paygate_types::{GatewayError, PaymentId, Result};

use crate::dto::{command_response, AuthorizeRequest, CaptureRequest, RefundRequest, VoidRequest};
use crate::error::ApiResult;
use crate::handlers::require_idempotency_key;
use crate::state::AppState;

async fn with_deadline<F>(state: &AppState, operation: F) -> Result<CommandOutcome>
where
    F: Future<Output = Result<CommandOutcome>>,
{
    match tokio::time::timeout(state.request_timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout {
            message: "request deadline exceeded".to_string(),
        }),
    }
}

fn parse_payment_id(raw: &str) -> Result<PaymentId> {
    raw.parse()
}

pub async fn authorize(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<AuthorizeRequest>,
) -> ApiResult<Response> {
    let idempotency_key = require_idempotency_key(&headers)?;
    let cmd = AuthorizeCommand {
        idempotency_key,
        order_id: req.order_id,
        customer_id: req.customer_id,
        amount_cents: req.amount_cents,
        card_number: req.card_number,
        cvv: req.cvv,
        expiry_month: req.expiry_month,
        expiry_year: req.expiry_year,
    };
    let outcome = with_deadline(&state, state.payments.authorize(cmd)).await?;
    Ok(command_response(StatusCode::CREATED, outcome))
}

pub async fn capture(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CaptureRequest>,
) -> ApiResult<Response> {
    let idempotency_key = require_idempotency_key(&headers)?;
    let cmd = CaptureCommand {
        idempotency_key,
        payment_id: parse_payment_id(&req.payment_id)?,
        amount_cents: req.amount,
    };
    let outcome = with_deadline(&state, state.payments.capture(cmd)).await?;
    Ok(command_response(StatusCode::OK, outcome))
}

pub async fn void(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<VoidRequest>,
) -> ApiResult<Response> {
    let idempotency_key = require_idempotency_key(&headers)?;
    let cmd = VoidCommand {
        idempotency_key,
        payment_id: parse_payment_id(&req.payment_id)?,
    };
    let outcome = with_deadline(&state, state.payments.void(cmd)).await?;
    Ok(command_response(StatusCode::OK, outcome))
}

pub async fn refund(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RefundRequest>,
) -> ApiResult<Response> {
    let idempotency_key = require_idempotency_key(&headers)?;
    let cmd = RefundCommand {
        idempotency_key,
        payment_id: parse_payment_id(&req.payment_id)?,
        amount_cents: req.amount,
    };
    let outcome = with_deadline(&state, state.payments.refund(cmd)).await?;
    Ok(command_response(StatusCode::OK, outcome))
}
