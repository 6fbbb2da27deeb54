//! Payment aggregate and state machine
//!
//! The aggregate is pure: transition methods check the current state,
//! mutate the struct, and return `INVALID_STATE_TRANSITION` when the
//! pre-state is not legal. The repository owns `version` bumps; the
//! orchestration layer owns `attempt_count` and retry scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorCategory, GatewayError, Result};

/// Stable opaque payment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for PaymentId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| GatewayError::validation("payment_id", "not a valid payment id"))
    }
}

/// The four bank-facing operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Authorize,
    Capture,
    Void,
    Refund,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorize => "AUTHORIZE",
            Self::Capture => "CAPTURE",
            Self::Void => "VOID",
            Self::Refund => "REFUND",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AUTHORIZE" => Ok(Self::Authorize),
            "CAPTURE" => Ok(Self::Capture),
            "VOID" => Ok(Self::Void),
            "REFUND" => Ok(Self::Refund),
            other => Err(GatewayError::internal(format!(
                "unknown operation type: {other}"
            ))),
        }
    }
}

/// Payment lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Authorizing,
    Authorized,
    AuthFailed,
    Capturing,
    Captured,
    CaptureFailed,
    Voiding,
    Voided,
    VoidFailed,
    Refunding,
    Refunded,
    RefundFailed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Authorizing => "AUTHORIZING",
            Self::Authorized => "AUTHORIZED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::Capturing => "CAPTURING",
            Self::Captured => "CAPTURED",
            Self::CaptureFailed => "CAPTURE_FAILED",
            Self::Voiding => "VOIDING",
            Self::Voided => "VOIDED",
            Self::VoidFailed => "VOID_FAILED",
            Self::Refunding => "REFUNDING",
            Self::Refunded => "REFUNDED",
            Self::RefundFailed => "REFUND_FAILED",
            Self::Expired => "EXPIRED",
        }
    }

    /// States that free the order id for reuse and admit no further operations
    /// (a `*_FAILED` state is terminal only once its failure is non-retryable,
    /// which this method cannot see; callers check `last_error_category`)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AuthFailed | Self::Voided | Self::Refunded | Self::Expired
        )
    }

    /// Intermediate states: a bank call is (or was) in flight
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Authorizing | Self::Capturing | Self::Voiding | Self::Refunding
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            Self::AuthFailed | Self::CaptureFailed | Self::VoidFailed | Self::RefundFailed
        )
    }

    /// The operation implied by a `*_FAILED` status
    pub fn failed_operation(&self) -> Option<OperationType> {
        match self {
            Self::AuthFailed => Some(OperationType::Authorize),
            Self::CaptureFailed => Some(OperationType::Capture),
            Self::VoidFailed => Some(OperationType::Void),
            Self::RefundFailed => Some(OperationType::Refund),
            _ => None,
        }
    }

    /// The operation implied by a `*ING` status
    pub fn in_flight_operation(&self) -> Option<OperationType> {
        match self {
            Self::Authorizing => Some(OperationType::Authorize),
            Self::Capturing => Some(OperationType::Capture),
            Self::Voiding => Some(OperationType::Void),
            Self::Refunding => Some(OperationType::Refund),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "AUTHORIZING" => Ok(Self::Authorizing),
            "AUTHORIZED" => Ok(Self::Authorized),
            "AUTH_FAILED" => Ok(Self::AuthFailed),
            "CAPTURING" => Ok(Self::Capturing),
            "CAPTURED" => Ok(Self::Captured),
            "CAPTURE_FAILED" => Ok(Self::CaptureFailed),
            "VOIDING" => Ok(Self::Voiding),
            "VOIDED" => Ok(Self::Voided),
            "VOID_FAILED" => Ok(Self::VoidFailed),
            "REFUNDING" => Ok(Self::Refunding),
            "REFUNDED" => Ok(Self::Refunded),
            "REFUND_FAILED" => Ok(Self::RefundFailed),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(GatewayError::internal(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// The payment aggregate root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    /// Amount requested at capture; at most `amount_cents`
    pub capture_amount_cents: Option<i64>,
    /// Amount requested at refund; at most the captured amount
    pub refund_amount_cents: Option<i64>,
    pub currency: String,
    pub status: PaymentStatus,
    pub bank_auth_id: Option<String>,
    pub bank_capture_id: Option<String>,
    pub bank_void_id: Option<String>,
    pub bank_refund_id: Option<String>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub attempt_count: i32,
    pub last_error_category: Option<ErrorCategory>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Create a new payment in `PENDING`
    pub fn new(
        order_id: impl Into<String>,
        customer_id: impl Into<String>,
        amount_cents: i64,
        currency: impl Into<String>,
    ) -> Result<Self> {
        if amount_cents <= 0 {
            return Err(GatewayError::validation(
                "amount_cents",
                "amount must be positive",
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: PaymentId::new(),
            order_id: order_id.into(),
            customer_id: customer_id.into(),
            amount_cents,
            capture_amount_cents: None,
            refund_amount_cents: None,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            bank_auth_id: None,
            bank_capture_id: None,
            bank_void_id: None,
            bank_refund_id: None,
            authorized_at: None,
            captured_at: None,
            voided_at: None,
            refunded_at: None,
            expires_at: None,
            attempt_count: 0,
            last_error_category: None,
            next_retry_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether a retry may re-enter the in-flight state from a `*_FAILED` status
    fn retry_allowed(&self) -> bool {
        self.last_error_category
            .map(|c| c.is_retryable())
            .unwrap_or(false)
    }

    fn illegal(&self, operation: &'static str) -> GatewayError {
        GatewayError::InvalidStateTransition {
            from: self.status,
            operation,
        }
    }

    // ========================================================================
    // Authorize
    // ========================================================================

    pub fn begin_authorize(&mut self) -> Result<()> {
        match self.status {
            PaymentStatus::Pending => {}
            PaymentStatus::AuthFailed if self.retry_allowed() => {}
            _ => return Err(self.illegal("authorize")),
        }
        self.status = PaymentStatus::Authorizing;
        Ok(())
    }

    pub fn complete_authorize(
        &mut self,
        bank_auth_id: String,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if self.status != PaymentStatus::Authorizing {
            return Err(self.illegal("complete authorization of"));
        }
        self.status = PaymentStatus::Authorized;
        self.bank_auth_id = Some(bank_auth_id);
        self.authorized_at = Some(Utc::now());
        self.expires_at = expires_at;
        self.last_error_category = None;
        self.next_retry_at = None;
        Ok(())
    }

    pub fn fail_authorize(&mut self, category: ErrorCategory) -> Result<()> {
        if self.status != PaymentStatus::Authorizing {
            return Err(self.illegal("fail authorization of"));
        }
        self.status = PaymentStatus::AuthFailed;
        self.last_error_category = Some(category);
        Ok(())
    }

    // ========================================================================
    // Capture
    // ========================================================================

    pub fn begin_capture(&mut self, amount_cents: i64) -> Result<()> {
        match self.status {
            PaymentStatus::Authorized => {}
            PaymentStatus::CaptureFailed if self.retry_allowed() => {}
            _ => return Err(self.illegal("capture")),
        }
        if amount_cents <= 0 || amount_cents > self.amount_cents {
            return Err(GatewayError::validation(
                "amount",
                "capture amount must be positive and at most the authorized amount",
            ));
        }
        self.capture_amount_cents = Some(amount_cents);
        self.status = PaymentStatus::Capturing;
        Ok(())
    }

    pub fn complete_capture(&mut self, bank_capture_id: String) -> Result<()> {
        if self.status != PaymentStatus::Capturing {
            return Err(self.illegal("complete capture of"));
        }
        self.status = PaymentStatus::Captured;
        self.bank_capture_id = Some(bank_capture_id);
        self.captured_at = Some(Utc::now());
        self.last_error_category = None;
        self.next_retry_at = None;
        Ok(())
    }

    pub fn fail_capture(&mut self, category: ErrorCategory) -> Result<()> {
        if self.status != PaymentStatus::Capturing {
            return Err(self.illegal("fail capture of"));
        }
        self.status = PaymentStatus::CaptureFailed;
        self.last_error_category = Some(category);
        Ok(())
    }

    // ========================================================================
    // Void
    // ========================================================================

    pub fn begin_void(&mut self) -> Result<()> {
        match self.status {
            PaymentStatus::Authorized => {}
            PaymentStatus::VoidFailed if self.retry_allowed() => {}
            _ => return Err(self.illegal("void")),
        }
        self.status = PaymentStatus::Voiding;
        Ok(())
    }

    pub fn complete_void(&mut self, bank_void_id: String) -> Result<()> {
        if self.status != PaymentStatus::Voiding {
            return Err(self.illegal("complete void of"));
        }
        self.status = PaymentStatus::Voided;
        self.bank_void_id = Some(bank_void_id);
        self.voided_at = Some(Utc::now());
        self.last_error_category = None;
        self.next_retry_at = None;
        Ok(())
    }

    pub fn fail_void(&mut self, category: ErrorCategory) -> Result<()> {
        if self.status != PaymentStatus::Voiding {
            return Err(self.illegal("fail void of"));
        }
        self.status = PaymentStatus::VoidFailed;
        self.last_error_category = Some(category);
        Ok(())
    }

    // ========================================================================
    // Refund
    // ========================================================================

    pub fn begin_refund(&mut self, amount_cents: i64) -> Result<()> {
        match self.status {
            PaymentStatus::Captured => {}
            PaymentStatus::RefundFailed if self.retry_allowed() => {}
            _ => return Err(self.illegal("refund")),
        }
        let captured = self.capture_amount_cents.unwrap_or(self.amount_cents);
        if amount_cents <= 0 || amount_cents > captured {
            return Err(GatewayError::validation(
                "amount",
                "refund amount must be positive and at most the captured amount",
            ));
        }
        self.refund_amount_cents = Some(amount_cents);
        self.status = PaymentStatus::Refunding;
        Ok(())
    }

    pub fn complete_refund(&mut self, bank_refund_id: String) -> Result<()> {
        if self.status != PaymentStatus::Refunding {
            return Err(self.illegal("complete refund of"));
        }
        self.status = PaymentStatus::Refunded;
        self.bank_refund_id = Some(bank_refund_id);
        self.refunded_at = Some(Utc::now());
        self.last_error_category = None;
        self.next_retry_at = None;
        Ok(())
    }

    pub fn fail_refund(&mut self, category: ErrorCategory) -> Result<()> {
        if self.status != PaymentStatus::Refunding {
            return Err(self.illegal("fail refund of"));
        }
        self.status = PaymentStatus::RefundFailed;
        self.last_error_category = Some(category);
        Ok(())
    }

    // ========================================================================
    // Expiration
    // ========================================================================

    /// Mark an aged authorization as expired.
    ///
    /// Legal from `AUTHORIZED` directly, or from `VOIDED` when the
    /// expiration worker has just voided the authorization at the bank
    /// and relabels the outcome to distinguish it from a merchant void.
    pub fn expire(&mut self) -> Result<()> {
        match self.status {
            PaymentStatus::Authorized | PaymentStatus::Voided => {}
            _ => return Err(self.illegal("expire")),
        }
        self.status = PaymentStatus::Expired;
        self.last_error_category = Some(ErrorCategory::Expired);
        self.next_retry_at = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Payment {
        Payment::new("o1", "c1", 5000, "USD").unwrap()
    }

    fn authorized() -> Payment {
        let mut p = pending();
        p.begin_authorize().unwrap();
        p.complete_authorize("auth-1".to_string(), None).unwrap();
        p
    }

    fn captured() -> Payment {
        let mut p = authorized();
        p.begin_capture(5000).unwrap();
        p.complete_capture("cap-1".to_string()).unwrap();
        p
    }

    #[test]
    fn rejects_non_positive_amount() {
        assert!(Payment::new("o1", "c1", 0, "USD").is_err());
        assert!(Payment::new("o1", "c1", -100, "USD").is_err());
    }

    #[test]
    fn happy_path_authorize_capture_refund() {
        let mut p = pending();
        p.begin_authorize().unwrap();
        assert_eq!(p.status, PaymentStatus::Authorizing);
        p.complete_authorize("auth-1".to_string(), None).unwrap();
        assert_eq!(p.status, PaymentStatus::Authorized);
        assert_eq!(p.bank_auth_id.as_deref(), Some("auth-1"));
        assert!(p.authorized_at.is_some());

        p.begin_capture(5000).unwrap();
        p.complete_capture("cap-1".to_string()).unwrap();
        assert_eq!(p.status, PaymentStatus::Captured);

        p.begin_refund(5000).unwrap();
        p.complete_refund("ref-1".to_string()).unwrap();
        assert_eq!(p.status, PaymentStatus::Refunded);
        assert!(p.bank_void_id.is_none());
    }

    #[test]
    fn void_from_authorized() {
        let mut p = authorized();
        p.begin_void().unwrap();
        p.complete_void("void-1".to_string()).unwrap();
        assert_eq!(p.status, PaymentStatus::Voided);
        assert!(p.voided_at.is_some());
    }

    #[test]
    fn cannot_capture_pending_payment() {
        let mut p = pending();
        let err = p.begin_capture(5000).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE_TRANSITION");
        assert_eq!(p.status, PaymentStatus::Pending);
    }

    #[test]
    fn cannot_refund_before_capture() {
        let mut p = authorized();
        assert!(p.begin_refund(5000).is_err());
    }

    #[test]
    fn cannot_void_captured_payment() {
        let mut p = captured();
        assert!(p.begin_void().is_err());
    }

    #[test]
    fn cannot_authorize_twice() {
        let mut p = authorized();
        assert!(p.begin_authorize().is_err());
    }

    #[test]
    fn retry_reenters_in_flight_only_when_retryable() {
        let mut p = pending();
        p.begin_authorize().unwrap();
        p.fail_authorize(ErrorCategory::BankTransient).unwrap();
        assert_eq!(p.status, PaymentStatus::AuthFailed);
        p.begin_authorize().unwrap();
        assert_eq!(p.status, PaymentStatus::Authorizing);

        let mut p = pending();
        p.begin_authorize().unwrap();
        p.fail_authorize(ErrorCategory::BankDeclined).unwrap();
        assert!(p.begin_authorize().is_err());
    }

    #[test]
    fn capture_retry_after_transient_failure() {
        let mut p = authorized();
        p.begin_capture(5000).unwrap();
        p.fail_capture(ErrorCategory::BankUnknown).unwrap();
        assert_eq!(p.status, PaymentStatus::CaptureFailed);
        p.begin_capture(5000).unwrap();
        p.complete_capture("cap-2".to_string()).unwrap();
        assert_eq!(p.status, PaymentStatus::Captured);
    }

    #[test]
    fn success_clears_failure_bookkeeping() {
        let mut p = pending();
        p.begin_authorize().unwrap();
        p.fail_authorize(ErrorCategory::BankTransient).unwrap();
        p.next_retry_at = Some(Utc::now());
        p.begin_authorize().unwrap();
        p.complete_authorize("auth-1".to_string(), None).unwrap();
        assert!(p.last_error_category.is_none());
        assert!(p.next_retry_at.is_none());
    }

    #[test]
    fn expire_from_authorized_and_after_void() {
        let mut p = authorized();
        p.expire().unwrap();
        assert_eq!(p.status, PaymentStatus::Expired);
        assert_eq!(p.last_error_category, Some(ErrorCategory::Expired));

        let mut p = authorized();
        p.begin_void().unwrap();
        p.complete_void("void-1".to_string()).unwrap();
        p.expire().unwrap();
        assert_eq!(p.status, PaymentStatus::Expired);
        assert_eq!(p.bank_void_id.as_deref(), Some("void-1"));
    }

    #[test]
    fn expire_rejected_elsewhere() {
        let mut p = captured();
        assert!(p.expire().is_err());
        let mut p = pending();
        assert!(p.expire().is_err());
    }

    #[test]
    fn terminal_states_admit_nothing() {
        let mut p = captured();
        p.begin_refund(5000).unwrap();
        p.complete_refund("ref-1".to_string()).unwrap();
        assert!(p.begin_capture(5000).is_err());
        assert!(p.begin_void().is_err());
        assert!(p.begin_refund(5000).is_err());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for s in [
            PaymentStatus::Pending,
            PaymentStatus::Authorizing,
            PaymentStatus::Authorized,
            PaymentStatus::AuthFailed,
            PaymentStatus::Capturing,
            PaymentStatus::Captured,
            PaymentStatus::CaptureFailed,
            PaymentStatus::Voiding,
            PaymentStatus::Voided,
            PaymentStatus::VoidFailed,
            PaymentStatus::Refunding,
            PaymentStatus::Refunded,
            PaymentStatus::RefundFailed,
            PaymentStatus::Expired,
        ] {
            let parsed: PaymentStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn in_flight_and_failed_operations() {
        assert_eq!(
            PaymentStatus::Capturing.in_flight_operation(),
            Some(OperationType::Capture)
        );
        assert_eq!(
            PaymentStatus::RefundFailed.failed_operation(),
            Some(OperationType::Refund)
        );
        assert_eq!(PaymentStatus::Authorized.in_flight_operation(), None);
        assert_eq!(PaymentStatus::Authorized.failed_operation(), None);
    }

    #[test]
    fn status_predicates() {
        assert!(PaymentStatus::Voided.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
        assert!(!PaymentStatus::Captured.is_terminal());
        assert!(PaymentStatus::Refunding.is_in_flight());
        assert!(!PaymentStatus::Refunded.is_in_flight());
        assert!(PaymentStatus::CaptureFailed.is_failed());
        assert!(!PaymentStatus::Pending.is_failed());
    }
}
