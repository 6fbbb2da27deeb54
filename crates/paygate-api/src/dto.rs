//! Request and response DTOs
//!
//! Command responses use the `{"success": true, "data": ...}` envelope;
//! failures use `{"success": false, "error": {"code", "message"}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use paygate_core::CommandOutcome;
use paygate_types::Payment;

use crate::error::status_for;

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub order_id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    pub card_number: String,
    pub cvv: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub payment_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct VoidRequest {
    pub payment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub payment_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

pub fn success_body(data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "success": true, "data": data })
}

pub fn payment_body(payment: &Payment) -> serde_json::Value {
    success_body(serde_json::to_value(payment).unwrap_or_default())
}

/// Render a command outcome.
///
/// Fresh completions and successful replays share `success_status`
/// (201 for authorize, 200 elsewhere); replayed failures re-derive
/// their status from the recorded category and emit the stored body
/// verbatim.
pub fn command_response(success_status: StatusCode, outcome: CommandOutcome) -> Response {
    match outcome {
        CommandOutcome::Completed(payment) => {
            (success_status, Json(payment_body(&payment))).into_response()
        }
        CommandOutcome::Replayed(snapshot) => match snapshot.category {
            None => (success_status, Json(success_body(snapshot.body))).into_response(),
            Some(category) => (
                status_for(category),
                Json(serde_json::json!({ "success": false, "error": snapshot.body })),
            )
                .into_response(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_core::ReplaySnapshot;
    use paygate_types::ErrorCategory;

    #[test]
    fn successful_replay_keeps_success_status() {
        let payment = Payment::new("o1", "c1", 5000, "USD").unwrap();
        let snapshot = ReplaySnapshot::success(&payment).unwrap();
        let response = command_response(StatusCode::CREATED, CommandOutcome::Replayed(snapshot));
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn failed_replay_recovers_status_from_category() {
        let snapshot = ReplaySnapshot {
            category: Some(ErrorCategory::BankDeclined),
            body: serde_json::json!({ "code": "BANK_DECLINED", "message": "declined" }),
        };
        let response = command_response(StatusCode::CREATED, CommandOutcome::Replayed(snapshot));
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn capture_request_decodes() {
        let req: CaptureRequest =
            serde_json::from_str(r#"{"payment_id": "abc", "amount": 5000}"#).unwrap();
        assert_eq!(req.amount, 5000);
    }
}
