//! Payment repository
//!
//! Every method takes a `&mut PgConnection` so the same interface works
//! on a pooled connection and inside an open transaction. Writes inside
//! a transaction are expected to have locked the target row first via
//! [`PaymentRepo::get_by_id_for_update`]; `update` additionally enforces
//! the optimistic `version` check.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use paygate_types::{Payment, PaymentId};

use crate::error::{is_unique_violation, DbError, DbResult};
use crate::models::DbPayment;

const SELECT_COLUMNS: &str = "SELECT * FROM payments";

pub struct PaymentRepo;

impl PaymentRepo {
    pub fn new() -> Self {
        Self
    }

    pub async fn create(&self, conn: &mut PgConnection, payment: &Payment) -> DbResult<Payment> {
        let row = sqlx::query_as::<_, DbPayment>(
            r#"
            INSERT INTO payments (id, order_id, customer_id, amount_cents, currency, status,
                attempt_count, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(payment.id.0)
        .bind(&payment.order_id)
        .bind(&payment.customer_id)
        .bind(payment.amount_cents)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.attempt_count)
        .bind(payment.version)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DbError::DuplicateOrder {
                    order_id: payment.order_id.clone(),
                }
            } else {
                DbError::Query(e)
            }
        })?;
        row.try_into()
    }

    pub async fn get_by_id(
        &self,
        conn: &mut PgConnection,
        id: PaymentId,
    ) -> DbResult<Option<Payment>> {
        let row = sqlx::query_as::<_, DbPayment>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Load and lock the aggregate row for the rest of the transaction
    pub async fn get_by_id_for_update(
        &self,
        conn: &mut PgConnection,
        id: PaymentId,
    ) -> DbResult<Option<Payment>> {
        let row =
            sqlx::query_as::<_, DbPayment>(&format!("{SELECT_COLUMNS} WHERE id = $1 FOR UPDATE"))
                .bind(id.0)
                .fetch_optional(&mut *conn)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Most recent payment for an order id (terminal attempts included)
    pub async fn get_by_order_id(
        &self,
        conn: &mut PgConnection,
        order_id: &str,
    ) -> DbResult<Option<Payment>> {
        let row = sqlx::query_as::<_, DbPayment>(&format!(
            "{SELECT_COLUMNS} WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    pub async fn find_by_customer_id(
        &self,
        conn: &mut PgConnection,
        customer_id: &str,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, DbPayment>(&format!(
            "{SELECT_COLUMNS} WHERE customer_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(customer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Compare-and-set write: persists every mutable field, bumps
    /// `version`, and fails with a conflict when the expected version
    /// no longer matches.
    pub async fn update(
        &self,
        conn: &mut PgConnection,
        payment: &Payment,
        expected_version: i64,
    ) -> DbResult<Payment> {
        let row = sqlx::query_as::<_, DbPayment>(
            r#"
            UPDATE payments SET
                status = $3,
                capture_amount_cents = $4,
                refund_amount_cents = $5,
                bank_auth_id = $6,
                bank_capture_id = $7,
                bank_void_id = $8,
                bank_refund_id = $9,
                authorized_at = $10,
                captured_at = $11,
                voided_at = $12,
                refunded_at = $13,
                expires_at = $14,
                attempt_count = $15,
                last_error_category = $16,
                next_retry_at = $17,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING *
            "#,
        )
        .bind(payment.id.0)
        .bind(expected_version)
        .bind(payment.status.as_str())
        .bind(payment.capture_amount_cents)
        .bind(payment.refund_amount_cents)
        .bind(&payment.bank_auth_id)
        .bind(&payment.bank_capture_id)
        .bind(&payment.bank_void_id)
        .bind(&payment.bank_refund_id)
        .bind(payment.authorized_at)
        .bind(payment.captured_at)
        .bind(payment.voided_at)
        .bind(payment.refunded_at)
        .bind(payment.expires_at)
        .bind(payment.attempt_count)
        .bind(payment.last_error_category.map(|c| c.as_str()))
        .bind(payment.next_retry_at)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            // Reviving a terminal row can re-trip the live-order index
            if is_unique_violation(&e) {
                DbError::DuplicateOrder {
                    order_id: payment.order_id.clone(),
                }
            } else {
                DbError::Query(e)
            }
        })?
        .ok_or_else(|| DbError::VersionConflict {
            payment_id: payment.id.to_string(),
        })?;
        row.try_into()
    }

    /// Failed payments due for a retry, oldest deadline first.
    ///
    /// `FOR UPDATE SKIP LOCKED` keeps concurrent workers off the same
    /// rows for the duration of the selecting transaction.
    pub async fn list_retryable(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, DbPayment>(
            r#"
            SELECT * FROM payments
            WHERE status IN ('AUTH_FAILED', 'CAPTURE_FAILED', 'VOID_FAILED', 'REFUND_FAILED')
              AND next_retry_at IS NOT NULL
              AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Authorizations whose hold has lapsed
    pub async fn list_expired_authorizations(
        &self,
        conn: &mut PgConnection,
        now: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, DbPayment>(
            r#"
            SELECT * FROM payments
            WHERE status = 'AUTHORIZED'
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            ORDER BY expires_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Payments stranded in an intermediate state, e.g. by a crash
    /// between the pre-call commit and the post-call transaction.
    pub async fn list_stuck_in_flight(
        &self,
        conn: &mut PgConnection,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> DbResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, DbPayment>(
            r#"
            SELECT * FROM payments
            WHERE status IN ('AUTHORIZING', 'CAPTURING', 'VOIDING', 'REFUNDING')
              AND updated_at <= $1
            ORDER BY updated_at ASC
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

impl Default for PaymentRepo {
    fn default() -> Self {
        Self::new()
    }
}
