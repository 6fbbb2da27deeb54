//! Idempotency record types
//!
//! One record exists per `(operation_type, key)`. The record's response
//! snapshot is the authoritative replay source; it is written once at
//! completion and never regenerated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::payment::{OperationType, PaymentId};

/// Lifecycle of an idempotent operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStatus {
    InFlight,
    Succeeded,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InFlight => "IN_FLIGHT",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for IdempotencyStatus {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, GatewayError> {
        match s {
            "IN_FLIGHT" => Ok(Self::InFlight),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            other => Err(GatewayError::internal(format!(
                "unknown idempotency status: {other}"
            ))),
        }
    }
}

/// Outcome of claiming an idempotency slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// A new `IN_FLIGHT` record was inserted; the caller proceeds
    Fresh,
    /// Same fingerprint, still `IN_FLIGHT`; the caller fails with `DUPLICATE_IN_FLIGHT`
    InFlightMatch,
    /// Same fingerprint, terminal record; the caller replays the snapshot
    CompletedMatch,
    /// Same key, different request body; the caller fails with `IDEMPOTENCY_MISMATCH`
    FingerprintMismatch,
}

/// A claimed idempotent operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub operation_type: OperationType,
    pub key: String,
    pub request_fingerprint: String,
    pub payment_id: Option<PaymentId>,
    pub status: IdempotencyStatus,
    pub response_snapshot: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in [
            IdempotencyStatus::InFlight,
            IdempotencyStatus::Succeeded,
            IdempotencyStatus::Failed,
        ] {
            let parsed: IdempotencyStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
