//! Payment orchestration
//!
//! Every command follows the same two-transaction shape:
//!
//! 1. **T1** — claim the idempotency slot, lock (or create) the payment,
//!    enter the `*ING` state, bump `attempt_count`, commit. Once T1 is
//!    committed the attempt is durable: a crash from here on leaves a
//!    reconcilable `*ING` row rather than a lost request.
//! 2. **Bank call** — outside any transaction, through the retry
//!    wrapper, keyed by `sha256(op:payment_id:attempt_count)`.
//! 3. **T2** — relock the row, apply the success or failure transition,
//!    persist the outcome and the idempotency record's terminal state.
//!
//! Holding a database transaction open across the bank call is never
//! done.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgConnection;
use tracing::{info, warn};

use paygate_bank::{
    BankAuthorizeRequest, BankAuthorizeResponse, BankCaptureRequest, BankCaptureResponse,
    BankClient, BankRefundRequest, BankRefundResponse, BankVoidRequest, BankVoidResponse,
    CardDetails, RetryPolicy,
};
use paygate_db::{Database, IdempotencyRepo, PaymentRepo};
use paygate_types::{
    ClaimOutcome, ErrorCategory, GatewayError, IdempotencyStatus, OperationType, Payment,
    PaymentId, Result,
};

use crate::commands::{AuthorizeCommand, CaptureCommand, RefundCommand, VoidCommand};
use crate::fingerprint::{bank_idempotency_key, fingerprint};
use crate::outcome::{CommandOutcome, ReplaySnapshot};

/// All payments are USD today; the column exists for the day they are not.
pub const CURRENCY: &str = "USD";

/// Key prefix for voids synthesized by the expiration worker
pub const EXPIRE_KEY_PREFIX: &str = "expire:";

/// Successful bank responses, unified so T2 is written once
pub(crate) enum BankSuccess {
    Authorize(BankAuthorizeResponse),
    Capture(BankCaptureResponse),
    Void {
        response: BankVoidResponse,
        mark_expired: bool,
    },
    Refund(BankRefundResponse),
}

pub(crate) enum Claimed {
    Fresh,
    Replay(ReplaySnapshot),
}

pub struct PaymentService {
    pub(crate) db: Arc<Database>,
    pub(crate) payments: PaymentRepo,
    pub(crate) idempotency: IdempotencyRepo,
    pub(crate) bank: Arc<dyn BankClient>,
    pub(crate) retry_policy: RetryPolicy,
}

impl PaymentService {
    pub fn new(db: Arc<Database>, bank: Arc<dyn BankClient>, retry_policy: RetryPolicy) -> Self {
        Self {
            payments: db.payment_repo(),
            idempotency: db.idempotency_repo(),
            db,
            bank,
            retry_policy,
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn authorize(&self, cmd: AuthorizeCommand) -> Result<CommandOutcome> {
        cmd.validate()?;
        let op = OperationType::Authorize;
        let request_fingerprint = fingerprint(&cmd)?;

        // T1: claim the slot and create the payment already in AUTHORIZING.
        let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
        match self
            .claim(&mut tx, op, &cmd.idempotency_key, &request_fingerprint)
            .await?
        {
            Claimed::Replay(snapshot) => {
                commit(tx).await?;
                return Ok(CommandOutcome::Replayed(snapshot));
            }
            Claimed::Fresh => {}
        }

        let mut payment = Payment::new(&cmd.order_id, &cmd.customer_id, cmd.amount_cents, CURRENCY)?;
        payment.begin_authorize()?;
        payment.attempt_count = 1;
        let payment = self
            .payments
            .create(&mut tx, &payment)
            .await
            .map_err(GatewayError::from)?;
        self.idempotency
            .attach_payment(&mut tx, op, &cmd.idempotency_key, payment.id)
            .await
            .map_err(GatewayError::from)?;
        commit(tx).await?;

        info!(
            payment_id = %payment.id,
            order_id = %payment.order_id,
            amount_cents = payment.amount_cents,
            "Authorization started"
        );

        let bank_key = bank_idempotency_key(op, payment.id, payment.attempt_count);
        let result = self
            .bank
            .authorize(&BankAuthorizeRequest {
                idempotency_key: bank_key,
                amount_cents: payment.amount_cents,
                currency: payment.currency.clone(),
                card: CardDetails {
                    card_number: cmd.card_number,
                    cvv: cmd.cvv,
                    expiry_month: cmd.expiry_month,
                    expiry_year: cmd.expiry_year,
                },
            })
            .await
            .map(BankSuccess::Authorize);

        self.finish(op, payment.id, Some(&cmd.idempotency_key), result)
            .await
    }

    pub async fn capture(&self, cmd: CaptureCommand) -> Result<CommandOutcome> {
        cmd.validate()?;
        let op = OperationType::Capture;
        let request_fingerprint = fingerprint(&cmd)?;

        let payment = {
            let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
            match self
                .claim(&mut tx, op, &cmd.idempotency_key, &request_fingerprint)
                .await?
            {
                Claimed::Replay(snapshot) => {
                    commit(tx).await?;
                    return Ok(CommandOutcome::Replayed(snapshot));
                }
                Claimed::Fresh => {}
            }
            let mut payment = self.lock_payment(&mut tx, cmd.payment_id).await?;
            payment.begin_capture(cmd.amount_cents)?;
            payment.attempt_count += 1;
            payment.next_retry_at = None;
            let expected = payment.version;
            let payment = self
                .payments
                .update(&mut tx, &payment, expected)
                .await
                .map_err(GatewayError::from)?;
            self.idempotency
                .attach_payment(&mut tx, op, &cmd.idempotency_key, payment.id)
                .await
                .map_err(GatewayError::from)?;
            commit(tx).await?;
            payment
        };

        let result = self.call_capture(&payment).await.map(BankSuccess::Capture);
        self.finish(op, payment.id, Some(&cmd.idempotency_key), result)
            .await
    }

    pub async fn void(&self, cmd: VoidCommand) -> Result<CommandOutcome> {
        cmd.validate()?;
        let op = OperationType::Void;
        let request_fingerprint = fingerprint(&cmd)?;

        let payment = {
            let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
            match self
                .claim(&mut tx, op, &cmd.idempotency_key, &request_fingerprint)
                .await?
            {
                Claimed::Replay(snapshot) => {
                    commit(tx).await?;
                    return Ok(CommandOutcome::Replayed(snapshot));
                }
                Claimed::Fresh => {}
            }
            let mut payment = self.lock_payment(&mut tx, cmd.payment_id).await?;
            payment.begin_void()?;
            payment.attempt_count += 1;
            payment.next_retry_at = None;
            let expected = payment.version;
            let payment = self
                .payments
                .update(&mut tx, &payment, expected)
                .await
                .map_err(GatewayError::from)?;
            self.idempotency
                .attach_payment(&mut tx, op, &cmd.idempotency_key, payment.id)
                .await
                .map_err(GatewayError::from)?;
            commit(tx).await?;
            payment
        };

        let result = self.call_void(&payment).await.map(|response| BankSuccess::Void {
            response,
            mark_expired: false,
        });
        self.finish(op, payment.id, Some(&cmd.idempotency_key), result)
            .await
    }

    pub async fn refund(&self, cmd: RefundCommand) -> Result<CommandOutcome> {
        cmd.validate()?;
        let op = OperationType::Refund;
        let request_fingerprint = fingerprint(&cmd)?;

        let payment = {
            let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
            match self
                .claim(&mut tx, op, &cmd.idempotency_key, &request_fingerprint)
                .await?
            {
                Claimed::Replay(snapshot) => {
                    commit(tx).await?;
                    return Ok(CommandOutcome::Replayed(snapshot));
                }
                Claimed::Fresh => {}
            }
            let mut payment = self.lock_payment(&mut tx, cmd.payment_id).await?;
            payment.begin_refund(cmd.amount_cents)?;
            payment.attempt_count += 1;
            payment.next_retry_at = None;
            let expected = payment.version;
            let payment = self
                .payments
                .update(&mut tx, &payment, expected)
                .await
                .map_err(GatewayError::from)?;
            self.idempotency
                .attach_payment(&mut tx, op, &cmd.idempotency_key, payment.id)
                .await
                .map_err(GatewayError::from)?;
            commit(tx).await?;
            payment
        };

        let result = self.call_refund(&payment).await.map(BankSuccess::Refund);
        self.finish(op, payment.id, Some(&cmd.idempotency_key), result)
            .await
    }

    // ========================================================================
    // Shared plumbing
    // ========================================================================

    pub(crate) async fn claim(
        &self,
        conn: &mut PgConnection,
        op: OperationType,
        key: &str,
        request_fingerprint: &str,
    ) -> Result<Claimed> {
        let (record, outcome) = self
            .idempotency
            .claim(conn, op, key, request_fingerprint)
            .await
            .map_err(GatewayError::from)?;
        match outcome {
            ClaimOutcome::Fresh => Ok(Claimed::Fresh),
            ClaimOutcome::CompletedMatch => {
                let value = record.response_snapshot.ok_or_else(|| {
                    GatewayError::internal("completed idempotency record has no snapshot")
                })?;
                Ok(Claimed::Replay(ReplaySnapshot::from_value(value)?))
            }
            ClaimOutcome::InFlightMatch => Err(GatewayError::DuplicateInFlight {
                key: key.to_string(),
            }),
            ClaimOutcome::FingerprintMismatch => Err(GatewayError::IdempotencyMismatch {
                key: key.to_string(),
            }),
        }
    }

    pub(crate) async fn lock_payment(
        &self,
        conn: &mut PgConnection,
        id: PaymentId,
    ) -> Result<Payment> {
        self.payments
            .get_by_id_for_update(conn, id)
            .await
            .map_err(GatewayError::from)?
            .ok_or_else(|| GatewayError::PaymentNotFound {
                payment_id: id.to_string(),
            })
    }

    pub(crate) async fn call_capture(&self, payment: &Payment) -> Result<BankCaptureResponse> {
        let auth_id = payment
            .bank_auth_id
            .clone()
            .ok_or_else(|| GatewayError::internal("capturing a payment without a bank auth id"))?;
        let amount_cents = payment.capture_amount_cents.unwrap_or(payment.amount_cents);
        self.bank
            .capture(&BankCaptureRequest {
                idempotency_key: bank_idempotency_key(
                    OperationType::Capture,
                    payment.id,
                    payment.attempt_count,
                ),
                auth_id,
                amount_cents,
            })
            .await
    }

    pub(crate) async fn call_void(&self, payment: &Payment) -> Result<BankVoidResponse> {
        let auth_id = payment
            .bank_auth_id
            .clone()
            .ok_or_else(|| GatewayError::internal("voiding a payment without a bank auth id"))?;
        self.bank
            .void(&BankVoidRequest {
                idempotency_key: bank_idempotency_key(
                    OperationType::Void,
                    payment.id,
                    payment.attempt_count,
                ),
                auth_id,
            })
            .await
    }

    pub(crate) async fn call_refund(&self, payment: &Payment) -> Result<BankRefundResponse> {
        let capture_id = payment
            .bank_capture_id
            .clone()
            .ok_or_else(|| GatewayError::internal("refunding a payment without a bank capture id"))?;
        let amount_cents = payment
            .refund_amount_cents
            .or(payment.capture_amount_cents)
            .unwrap_or(payment.amount_cents);
        self.bank
            .refund(&BankRefundRequest {
                idempotency_key: bank_idempotency_key(
                    OperationType::Refund,
                    payment.id,
                    payment.attempt_count,
                ),
                capture_id,
                amount_cents,
            })
            .await
    }

    /// T2: record the outcome of a bank call.
    ///
    /// `idem_key` is absent only on internal paths that have no client
    /// record to complete.
    pub(crate) async fn finish(
        &self,
        op: OperationType,
        payment_id: PaymentId,
        idem_key: Option<&str>,
        result: Result<BankSuccess>,
    ) -> Result<CommandOutcome> {
        let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
        let mut payment = self.lock_payment(&mut tx, payment_id).await?;
        let expected = payment.version;

        match result {
            Ok(success) => {
                apply_success(&mut payment, success)?;
                let payment = self
                    .payments
                    .update(&mut tx, &payment, expected)
                    .await
                    .map_err(GatewayError::from)?;
                if let Some(key) = idem_key {
                    let snapshot = ReplaySnapshot::success(&payment)?;
                    self.idempotency
                        .complete(&mut tx, op, key, IdempotencyStatus::Succeeded, &snapshot.to_value()?)
                        .await
                        .map_err(GatewayError::from)?;
                }
                commit(tx).await?;
                info!(
                    payment_id = %payment.id,
                    status = %payment.status,
                    operation = %op,
                    "Payment operation succeeded"
                );
                Ok(CommandOutcome::Completed(payment))
            }
            Err(err) => {
                let category = err.category();
                apply_failure(&mut payment, op, category)?;
                if category.is_retryable() {
                    payment.next_retry_at = Some(Utc::now() + self.backoff_after(&payment));
                } else {
                    payment.next_retry_at = None;
                }
                self.payments
                    .update(&mut tx, &payment, expected)
                    .await
                    .map_err(GatewayError::from)?;
                if let Some(key) = idem_key {
                    // An indeterminate outcome keeps the record IN_FLIGHT so
                    // reconciliation can still land the true result on it.
                    if category != ErrorCategory::BankUnknown {
                        let snapshot = ReplaySnapshot::failure(&err);
                        self.idempotency
                            .complete(&mut tx, op, key, IdempotencyStatus::Failed, &snapshot.to_value()?)
                            .await
                            .map_err(GatewayError::from)?;
                    }
                }
                commit(tx).await?;
                warn!(
                    payment_id = %payment_id,
                    operation = %op,
                    category = %category,
                    error = %err,
                    "Payment operation failed"
                );
                Err(err)
            }
        }
    }

    pub(crate) fn backoff_after(&self, payment: &Payment) -> ChronoDuration {
        let delay = self.retry_policy.backoff(payment.attempt_count.max(1) as u32);
        ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(60))
    }
}

fn apply_success(payment: &mut Payment, success: BankSuccess) -> Result<()> {
    match success {
        BankSuccess::Authorize(r) => payment.complete_authorize(r.auth_id, r.expires_at),
        BankSuccess::Capture(r) => payment.complete_capture(r.capture_id),
        BankSuccess::Void {
            response,
            mark_expired,
        } => {
            payment.complete_void(response.void_id)?;
            if mark_expired {
                payment.expire()?;
            }
            Ok(())
        }
        BankSuccess::Refund(r) => payment.complete_refund(r.refund_id),
    }
}

fn apply_failure(payment: &mut Payment, op: OperationType, category: ErrorCategory) -> Result<()> {
    match op {
        OperationType::Authorize => payment.fail_authorize(category),
        OperationType::Capture => payment.fail_capture(category),
        OperationType::Void => payment.fail_void(category),
        OperationType::Refund => payment.fail_refund(category),
    }
}

pub(crate) async fn commit(tx: sqlx::Transaction<'static, sqlx::Postgres>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| GatewayError::internal(format!("transaction commit failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_types::PaymentStatus;

    fn authorizing() -> Payment {
        let mut p = Payment::new("o1", "c1", 5000, CURRENCY).unwrap();
        p.begin_authorize().unwrap();
        p
    }

    #[test]
    fn success_application_per_operation() {
        let mut p = authorizing();
        apply_success(
            &mut p,
            BankSuccess::Authorize(BankAuthorizeResponse {
                auth_id: "auth-1".to_string(),
                expires_at: None,
            }),
        )
        .unwrap();
        assert_eq!(p.status, PaymentStatus::Authorized);

        p.begin_void().unwrap();
        apply_success(
            &mut p,
            BankSuccess::Void {
                response: BankVoidResponse {
                    void_id: "void-1".to_string(),
                },
                mark_expired: false,
            },
        )
        .unwrap();
        assert_eq!(p.status, PaymentStatus::Voided);
    }

    #[test]
    fn expiring_void_lands_on_expired() {
        let mut p = authorizing();
        p.complete_authorize("auth-1".to_string(), None).unwrap();
        p.begin_void().unwrap();
        apply_success(
            &mut p,
            BankSuccess::Void {
                response: BankVoidResponse {
                    void_id: "void-1".to_string(),
                },
                mark_expired: true,
            },
        )
        .unwrap();
        assert_eq!(p.status, PaymentStatus::Expired);
        assert_eq!(p.last_error_category, Some(ErrorCategory::Expired));
        assert_eq!(p.bank_void_id.as_deref(), Some("void-1"));
    }

    #[test]
    fn failure_application_records_category() {
        let mut p = authorizing();
        apply_failure(&mut p, OperationType::Authorize, ErrorCategory::BankTransient).unwrap();
        assert_eq!(p.status, PaymentStatus::AuthFailed);
        assert_eq!(p.last_error_category, Some(ErrorCategory::BankTransient));
    }

    #[test]
    fn failure_application_rejects_wrong_operation() {
        let mut p = authorizing();
        assert!(apply_failure(&mut p, OperationType::Refund, ErrorCategory::BankTransient).is_err());
        assert_eq!(p.status, PaymentStatus::Authorizing);
    }
}
