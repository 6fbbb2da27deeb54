//! Error taxonomy for the payment gateway
//!
//! Every failure is classified into an [`ErrorCategory`]; the category
//! is what control flow keys on (retry or abort, replay or reject),
//! while [`GatewayError::error_code`] is the stable string external
//! consumers see.

use thiserror::Error;

use crate::payment::PaymentStatus;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Recovery category of a failure.
///
/// Stored in `payments.last_error_category`, emitted in logs, and
/// asserted on in tests, so the string tags are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Bad input from the caller
    Validation,
    /// Unknown payment or order
    NotFound,
    /// Invariant violation (duplicate order id, idempotency mismatch, version race)
    Conflict,
    /// Operation not permitted in the payment's current state
    IllegalState,
    /// Bank returned a business-level decline; another attempt will not help
    BankDeclined,
    /// Bank 5xx, connect failure, or timeout before the request was sent; retryable
    BankTransient,
    /// Bank call outcome indeterminate (request may have been processed); retryable after reconciliation
    BankUnknown,
    /// Infrastructure failure (database, serialization)
    Internal,
    /// Request-scoped deadline exceeded
    Timeout,
    /// Authorization reclaimed by the expiration worker (marker, never a live error)
    Expired,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::IllegalState => "ILLEGAL_STATE",
            Self::BankDeclined => "BANK_DECLINED",
            Self::BankTransient => "BANK_TRANSIENT",
            Self::BankUnknown => "BANK_UNKNOWN",
            Self::Internal => "INTERNAL",
            Self::Timeout => "TIMEOUT",
            Self::Expired => "EXPIRED",
        }
    }

    /// Whether another attempt has a non-trivial chance of a different outcome
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BankTransient | Self::BankUnknown)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "VALIDATION" => Ok(Self::Validation),
            "NOT_FOUND" => Ok(Self::NotFound),
            "CONFLICT" => Ok(Self::Conflict),
            "ILLEGAL_STATE" => Ok(Self::IllegalState),
            "BANK_DECLINED" => Ok(Self::BankDeclined),
            "BANK_TRANSIENT" => Ok(Self::BankTransient),
            "BANK_UNKNOWN" => Ok(Self::BankUnknown),
            "INTERNAL" => Ok(Self::Internal),
            "TIMEOUT" => Ok(Self::Timeout),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(GatewayError::internal(format!(
                "unknown error category: {other}"
            ))),
        }
    }
}

/// Payment gateway error types
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    // ========================================================================
    // Input Errors
    // ========================================================================

    /// Invalid input
    #[error("Invalid input: {field} - {reason}")]
    Validation { field: String, reason: String },

    // ========================================================================
    // Lookup Errors
    // ========================================================================

    /// Payment not found
    #[error("Payment {payment_id} not found")]
    PaymentNotFound { payment_id: String },

    /// Order not found
    #[error("No payment found for order {order_id}")]
    OrderNotFound { order_id: String },

    // ========================================================================
    // Conflict Errors
    // ========================================================================

    /// Duplicate order id among non-terminal payments
    #[error("A payment for order {order_id} already exists")]
    OrderAlreadyExists { order_id: String },

    /// A request with the same idempotency key is still in flight
    #[error("Operation with idempotency key {key} is already in flight")]
    DuplicateInFlight { key: String },

    /// Idempotency key reused with a different request body
    #[error("Idempotency key {key} was used with a different request body")]
    IdempotencyMismatch { key: String },

    /// Optimistic concurrency check failed
    #[error("Payment {payment_id} was modified concurrently")]
    VersionConflict { payment_id: String },

    // ========================================================================
    // State Machine Errors
    // ========================================================================

    /// Operation not legal in the payment's current state
    #[error("Cannot {operation} a payment in state {from}")]
    InvalidStateTransition {
        from: PaymentStatus,
        operation: &'static str,
    },

    // ========================================================================
    // Bank Errors
    // ========================================================================

    /// Bank declined the operation
    #[error("Bank declined: {code} - {message}")]
    BankDeclined { code: String, message: String },

    /// Bank unavailable; the request was not processed
    #[error("Bank unavailable: {message}")]
    BankTransient { message: String },

    /// Bank call outcome unknown; the request may have been processed
    #[error("Bank outcome unknown: {message}")]
    BankUnknown { message: String },

    /// Retry budget exhausted; the underlying category is preserved
    #[error("Giving up after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<GatewayError>,
    },

    // ========================================================================
    // Infrastructure Errors
    // ========================================================================

    /// Request deadline exceeded
    #[error("Request timed out: {message}")]
    Timeout { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Recovery category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::PaymentNotFound { .. } | Self::OrderNotFound { .. } => ErrorCategory::NotFound,
            Self::OrderAlreadyExists { .. }
            | Self::DuplicateInFlight { .. }
            | Self::IdempotencyMismatch { .. }
            | Self::VersionConflict { .. } => ErrorCategory::Conflict,
            Self::InvalidStateTransition { .. } => ErrorCategory::IllegalState,
            Self::BankDeclined { .. } => ErrorCategory::BankDeclined,
            Self::BankTransient { .. } => ErrorCategory::BankTransient,
            Self::BankUnknown { .. } => ErrorCategory::BankUnknown,
            // Exhaustion changes the code, never the category
            Self::MaxRetriesExceeded { source, .. } => source.category(),
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Stable error code for external consumers
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::PaymentNotFound { .. } => "PAYMENT_NOT_FOUND",
            Self::OrderNotFound { .. } => "ORDER_NOT_FOUND",
            Self::OrderAlreadyExists { .. } => "ORDER_ALREADY_EXISTS",
            Self::DuplicateInFlight { .. } => "DUPLICATE_IN_FLIGHT",
            Self::IdempotencyMismatch { .. } => "IDEMPOTENCY_MISMATCH",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::BankDeclined { .. } => "BANK_DECLINED",
            Self::BankTransient { .. } => "BANK_UNAVAILABLE",
            Self::BankUnknown { .. } => "BANK_OUTCOME_UNKNOWN",
            Self::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
            Self::Timeout { .. } => "REQUEST_TIMEOUT",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether this failure should be scheduled for another attempt
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        let err = GatewayError::OrderAlreadyExists {
            order_id: "o1".to_string(),
        };
        assert_eq!(err.error_code(), "ORDER_ALREADY_EXISTS");
        assert_eq!(err.category(), ErrorCategory::Conflict);

        let err = GatewayError::IdempotencyMismatch {
            key: "k1".to_string(),
        };
        assert_eq!(err.error_code(), "IDEMPOTENCY_MISMATCH");
    }

    #[test]
    fn retryable_categories() {
        assert!(ErrorCategory::BankTransient.is_retryable());
        assert!(ErrorCategory::BankUnknown.is_retryable());
        assert!(!ErrorCategory::BankDeclined.is_retryable());
        assert!(!ErrorCategory::Internal.is_retryable());
        assert!(!ErrorCategory::Conflict.is_retryable());
    }

    #[test]
    fn exhaustion_preserves_category() {
        let inner = GatewayError::BankTransient {
            message: "503".to_string(),
        };
        let wrapped = GatewayError::MaxRetriesExceeded {
            attempts: 3,
            source: Box::new(inner),
        };
        assert_eq!(wrapped.error_code(), "MAX_RETRIES_EXCEEDED");
        assert_eq!(wrapped.category(), ErrorCategory::BankTransient);
        assert!(wrapped.is_retryable());
    }

    #[test]
    fn category_tags_round_trip() {
        for cat in [
            ErrorCategory::Validation,
            ErrorCategory::NotFound,
            ErrorCategory::Conflict,
            ErrorCategory::IllegalState,
            ErrorCategory::BankDeclined,
            ErrorCategory::BankTransient,
            ErrorCategory::BankUnknown,
            ErrorCategory::Internal,
            ErrorCategory::Timeout,
            ErrorCategory::Expired,
        ] {
            let parsed: ErrorCategory = cat.as_str().parse().unwrap();
            assert_eq!(parsed, cat);
        }
    }
}
