//! Command outcomes and replay snapshots
//!
//! A terminal idempotency record stores a [`ReplaySnapshot`]: the exact
//! client-visible JSON body plus the error category (absent on
//! success). Replays emit the stored body verbatim; the HTTP status is
//! re-derived from the category by the edge's pure mapping, so bytes
//! and status always agree with the first response.

use serde::{Deserialize, Serialize};

use paygate_types::{ErrorCategory, GatewayError, Payment, Result};

/// Result of an orchestration command
#[derive(Debug)]
pub enum CommandOutcome {
    /// The command ran to completion in this call
    Completed(Payment),
    /// A previous completion was replayed from the idempotency store
    Replayed(ReplaySnapshot),
}

/// The stored terminal response of an idempotent operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySnapshot {
    /// Error category of the recorded outcome; `None` means success
    pub category: Option<ErrorCategory>,
    /// Exact response body the client saw
    pub body: serde_json::Value,
}

impl ReplaySnapshot {
    pub fn success(payment: &Payment) -> Result<Self> {
        let body = serde_json::to_value(payment)
            .map_err(|e| GatewayError::internal(format!("failed to encode payment: {e}")))?;
        Ok(Self {
            category: None,
            body,
        })
    }

    pub fn failure(err: &GatewayError) -> Self {
        Self {
            category: Some(err.category()),
            body: error_body(err),
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| GatewayError::internal(format!("failed to encode snapshot: {e}")))
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| GatewayError::internal(format!("corrupt response snapshot: {e}")))
    }

    pub fn is_success(&self) -> bool {
        self.category.is_none()
    }
}

/// Client-visible error body.
///
/// Infrastructure detail never leaks: `INTERNAL` gets a fixed message.
/// Conflicting idempotent submissions and indeterminate bank outcomes
/// carry a hint about what the caller should do next.
pub fn error_body(err: &GatewayError) -> serde_json::Value {
    serde_json::json!({
        "code": err.error_code(),
        "message": client_message(err),
    })
}

fn client_message(err: &GatewayError) -> String {
    match err.category() {
        ErrorCategory::Internal => "An internal error occurred".to_string(),
        ErrorCategory::BankUnknown => format!(
            "{}; retry with the same idempotency key to learn the outcome",
            err
        ),
        ErrorCategory::Conflict => match err {
            GatewayError::DuplicateInFlight { .. } | GatewayError::IdempotencyMismatch { .. } => {
                format!("{}; query the payment by order id to check its status", err)
            }
            _ => err.to_string(),
        },
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips() {
        let payment = Payment::new("o1", "c1", 5000, "USD").unwrap();
        let snapshot = ReplaySnapshot::success(&payment).unwrap();
        let value = snapshot.to_value().unwrap();
        let restored = ReplaySnapshot::from_value(value).unwrap();
        assert!(restored.is_success());
        assert_eq!(restored.body, snapshot.body);
    }

    #[test]
    fn failure_snapshot_keeps_category_and_code() {
        let err = GatewayError::BankDeclined {
            code: "51".to_string(),
            message: "insufficient funds".to_string(),
        };
        let snapshot = ReplaySnapshot::failure(&err);
        assert_eq!(snapshot.category, Some(ErrorCategory::BankDeclined));
        assert_eq!(snapshot.body["code"], "BANK_DECLINED");
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = GatewayError::internal("connection pool exhausted on 10.0.0.3");
        let body = error_body(&err);
        assert_eq!(body["message"], "An internal error occurred");
        assert_eq!(body["code"], "INTERNAL_ERROR");
    }

    #[test]
    fn duplicate_in_flight_hints_at_order_lookup() {
        let err = GatewayError::DuplicateInFlight {
            key: "k1".to_string(),
        };
        let body = error_body(&err);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("order id"));
    }

    #[test]
    fn bank_unknown_instructs_retry_with_same_key() {
        let err = GatewayError::BankUnknown {
            message: "timed out".to_string(),
        };
        let body = error_body(&err);
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("same idempotency key"));
    }
}
