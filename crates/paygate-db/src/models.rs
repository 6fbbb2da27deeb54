//! Database models - mapped from PostgreSQL tables
//!
//! Rows carry statuses and categories as text; conversion into domain
//! types is fallible and surfaces corrupt rows as [`DbError::CorruptRow`].

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use paygate_types::{
    ErrorCategory, IdempotencyRecord, IdempotencyStatus, OperationType, Payment, PaymentId,
    PaymentStatus,
};

use crate::error::DbError;

#[derive(Debug, Clone, FromRow)]
pub struct DbPayment {
    pub id: Uuid,
    pub order_id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    pub capture_amount_cents: Option<i64>,
    pub refund_amount_cents: Option<i64>,
    pub currency: String,
    pub status: String,
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
    pub last_error_category: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPayment> for Payment {
    type Error = DbError;

    fn try_from(row: DbPayment) -> Result<Self, DbError> {
        let status: PaymentStatus = row
            .status
            .parse()
            .map_err(|_| DbError::CorruptRow(format!("payment status '{}'", row.status)))?;
        let last_error_category = row
            .last_error_category
            .as_deref()
            .map(|s| {
                s.parse::<ErrorCategory>()
                    .map_err(|_| DbError::CorruptRow(format!("error category '{s}'")))
            })
            .transpose()?;
        Ok(Payment {
            id: PaymentId(row.id),
            order_id: row.order_id,
            customer_id: row.customer_id,
            amount_cents: row.amount_cents,
            capture_amount_cents: row.capture_amount_cents,
            refund_amount_cents: row.refund_amount_cents,
            currency: row.currency,
            status,
            bank_auth_id: row.bank_auth_id,
            bank_capture_id: row.bank_capture_id,
            bank_void_id: row.bank_void_id,
            bank_refund_id: row.bank_refund_id,
            authorized_at: row.authorized_at,
            captured_at: row.captured_at,
            voided_at: row.voided_at,
            refunded_at: row.refunded_at,
            expires_at: row.expires_at,
            attempt_count: row.attempt_count,
            last_error_category,
            next_retry_at: row.next_retry_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbIdempotencyRecord {
    pub operation_type: String,
    pub key: String,
    pub request_fingerprint: String,
    pub payment_id: Option<Uuid>,
    pub status: String,
    pub response_snapshot: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbIdempotencyRecord> for IdempotencyRecord {
    type Error = DbError;

    fn try_from(row: DbIdempotencyRecord) -> Result<Self, DbError> {
        let operation_type: OperationType = row.operation_type.parse().map_err(|_| {
            DbError::CorruptRow(format!("operation type '{}'", row.operation_type))
        })?;
        let status: IdempotencyStatus = row
            .status
            .parse()
            .map_err(|_| DbError::CorruptRow(format!("idempotency status '{}'", row.status)))?;
        Ok(IdempotencyRecord {
            operation_type,
            key: row.key,
            request_fingerprint: row.request_fingerprint,
            payment_id: row.payment_id.map(PaymentId),
            status,
            response_snapshot: row.response_snapshot,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment_row() -> DbPayment {
        let now = Utc::now();
        DbPayment {
            id: Uuid::new_v4(),
            order_id: "o1".to_string(),
            customer_id: "c1".to_string(),
            amount_cents: 5000,
            capture_amount_cents: None,
            refund_amount_cents: None,
            currency: "USD".to_string(),
            status: "AUTHORIZED".to_string(),
            bank_auth_id: Some("auth-1".to_string()),
            bank_capture_id: None,
            bank_void_id: None,
            bank_refund_id: None,
            authorized_at: Some(now),
            captured_at: None,
            voided_at: None,
            refunded_at: None,
            expires_at: None,
            attempt_count: 1,
            last_error_category: None,
            next_retry_at: None,
            version: 3,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn payment_row_converts() {
        let payment: Payment = payment_row().try_into().unwrap();
        assert_eq!(payment.status, PaymentStatus::Authorized);
        assert_eq!(payment.version, 3);
        assert_eq!(payment.bank_auth_id.as_deref(), Some("auth-1"));
    }

    #[test]
    fn corrupt_status_is_rejected() {
        let mut row = payment_row();
        row.status = "SETTLED".to_string();
        assert!(Payment::try_from(row).is_err());
    }

    #[test]
    fn corrupt_category_is_rejected() {
        let mut row = payment_row();
        row.status = "AUTH_FAILED".to_string();
        row.last_error_category = Some("MYSTERY".to_string());
        assert!(Payment::try_from(row).is_err());
    }
}
