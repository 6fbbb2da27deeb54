//! Worker-facing recovery paths
//!
//! Three ways a payment gets unstuck:
//!
//! - `retry_payment` re-drives a retryable `*_FAILED` payment. Capture,
//!   void, and refund are re-issued to the bank under a fresh derived
//!   key; a failed authorize is *reconciled* instead, because card data
//!   is never retained and the original request cannot be re-sent.
//! - `reconcile_in_flight` resolves a payment stranded in `*ING` by a
//!   crash or cancellation between the pre-call commit and T2.
//! - `expire_payment` voids an aged authorization under the synthesized
//!   `expire:{payment_id}` key and relabels the outcome `EXPIRED`.
//!
//! Every path re-checks the payment's state under a row lock before
//! acting; the skip-locked batch selection plus the version CAS makes
//! concurrent workers safe.

use chrono::Utc;
use tracing::{info, warn};

use paygate_types::{ErrorCategory, GatewayError, IdempotencyStatus, OperationType, PaymentId, Result};

use crate::fingerprint::{bank_idempotency_key, fingerprint};
use crate::outcome::ReplaySnapshot;
use crate::service::{commit, BankSuccess, Claimed, PaymentService, EXPIRE_KEY_PREFIX};

impl PaymentService {
    /// Re-drive a payment in a retryable `*_FAILED` state.
    ///
    /// No-ops quietly if the payment was resolved or rescheduled since
    /// it was selected.
    pub async fn retry_payment(&self, payment_id: PaymentId) -> Result<()> {
        let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
        let Some(mut payment) = self
            .payments
            .get_by_id_for_update(&mut tx, payment_id)
            .await
            .map_err(GatewayError::from)?
        else {
            return Ok(());
        };
        let Some(op) = payment.status.failed_operation() else {
            return Ok(());
        };
        if !payment
            .last_error_category
            .map_or(false, |c| c.is_retryable())
        {
            return Ok(());
        }
        match payment.next_retry_at {
            Some(due) if due <= Utc::now() => {}
            _ => return Ok(()),
        }

        let record = self
            .idempotency
            .find_for_payment(&mut tx, payment.id, op)
            .await
            .map_err(GatewayError::from)?;
        let idem_key = record.map(|r| r.key);
        let mark_expired = idem_key
            .as_deref()
            .map_or(false, |k| k.starts_with(EXPIRE_KEY_PREFIX));

        if op == OperationType::Authorize {
            // Reconciliation path; no state change before the bank read.
            drop(tx);
            return self.reconcile_failed_authorize(payment_id, idem_key).await;
        }

        match op {
            OperationType::Capture => {
                let amount = payment.capture_amount_cents.unwrap_or(payment.amount_cents);
                payment.begin_capture(amount)?;
            }
            OperationType::Void => payment.begin_void()?,
            OperationType::Refund => {
                let amount = payment
                    .refund_amount_cents
                    .or(payment.capture_amount_cents)
                    .unwrap_or(payment.amount_cents);
                payment.begin_refund(amount)?;
            }
            OperationType::Authorize => unreachable!("handled above"),
        }
        payment.attempt_count += 1;
        payment.next_retry_at = None;
        let expected = payment.version;
        let payment = self
            .payments
            .update(&mut tx, &payment, expected)
            .await
            .map_err(GatewayError::from)?;
        commit(tx).await?;

        info!(
            payment_id = %payment.id,
            operation = %op,
            attempt = payment.attempt_count,
            "Retrying payment operation"
        );

        let result = match op {
            OperationType::Capture => self.call_capture(&payment).await.map(BankSuccess::Capture),
            OperationType::Void => self.call_void(&payment).await.map(|response| BankSuccess::Void {
                response,
                mark_expired,
            }),
            OperationType::Refund => self.call_refund(&payment).await.map(BankSuccess::Refund),
            OperationType::Authorize => unreachable!("handled above"),
        };

        match self.finish(op, payment.id, idem_key.as_deref(), result).await {
            Ok(_) => Ok(()),
            // The failure is already recorded durably; the worker loop
            // only needs to know the batch item is done.
            Err(_) => Ok(()),
        }
    }

    /// Resolve a payment stuck in an intermediate `*ING` state.
    pub async fn reconcile_in_flight(&self, payment_id: PaymentId) -> Result<()> {
        let payment = {
            let mut conn = self.db.acquire().await.map_err(GatewayError::from)?;
            match self
                .payments
                .get_by_id(&mut conn, payment_id)
                .await
                .map_err(GatewayError::from)?
            {
                Some(p) => p,
                None => return Ok(()),
            }
        };
        let Some(op) = payment.status.in_flight_operation() else {
            return Ok(());
        };

        if op == OperationType::Authorize {
            return self.reconcile_authorizing(payment_id, payment.attempt_count).await;
        }

        // The bank exposes no read API for these; reclassify as an
        // indeterminate failure and let the retry path re-issue the
        // call under the bank's idempotency guarantee.
        let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
        let mut payment = self.lock_payment(&mut tx, payment_id).await?;
        if payment.status.in_flight_operation() != Some(op) {
            return Ok(());
        }
        let expected = payment.version;
        match op {
            OperationType::Capture => payment.fail_capture(ErrorCategory::BankUnknown)?,
            OperationType::Void => payment.fail_void(ErrorCategory::BankUnknown)?,
            OperationType::Refund => payment.fail_refund(ErrorCategory::BankUnknown)?,
            OperationType::Authorize => unreachable!("handled above"),
        }
        payment.next_retry_at = Some(Utc::now());
        self.payments
            .update(&mut tx, &payment, expected)
            .await
            .map_err(GatewayError::from)?;
        commit(tx).await?;
        info!(
            payment_id = %payment_id,
            operation = %op,
            "Reclassified stuck in-flight payment for retry"
        );
        Ok(())
    }

    /// Ground truth for a stranded `AUTHORIZING` payment comes from the
    /// bank: look the attempt up by its derived idempotency key.
    async fn reconcile_authorizing(&self, payment_id: PaymentId, attempt_count: i32) -> Result<()> {
        let bank_key = bank_idempotency_key(OperationType::Authorize, payment_id, attempt_count);
        let lookup = self.bank.get_authorization(&bank_key).await;

        let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
        let mut payment = match self
            .payments
            .get_by_id_for_update(&mut tx, payment_id)
            .await
            .map_err(GatewayError::from)?
        {
            Some(p) => p,
            None => return Ok(()),
        };
        if payment.status != paygate_types::PaymentStatus::Authorizing {
            return Ok(());
        }
        let expected = payment.version;
        let record = self
            .idempotency
            .find_for_payment(&mut tx, payment.id, OperationType::Authorize)
            .await
            .map_err(GatewayError::from)?;
        let idem_key = record.map(|r| r.key);

        match lookup {
            Err(e) => {
                // Bank unreachable; leave the row for the next scan.
                warn!(payment_id = %payment_id, error = %e, "Reconciliation read failed");
                Ok(())
            }
            Ok(Some(status)) if status.approved => {
                payment.complete_authorize(status.auth_id, status.expires_at)?;
                let payment = self
                    .payments
                    .update(&mut tx, &payment, expected)
                    .await
                    .map_err(GatewayError::from)?;
                if let Some(key) = idem_key.as_deref() {
                    let snapshot = ReplaySnapshot::success(&payment)?;
                    self.idempotency
                        .complete(
                            &mut tx,
                            OperationType::Authorize,
                            key,
                            IdempotencyStatus::Succeeded,
                            &snapshot.to_value()?,
                        )
                        .await
                        .map_err(GatewayError::from)?;
                }
                commit(tx).await?;
                info!(payment_id = %payment_id, "Reconciled stranded authorization as AUTHORIZED");
                Ok(())
            }
            Ok(outcome) => {
                // Declined, or the bank never saw the request. Either
                // way the authorization definitively did not happen.
                let err = GatewayError::BankDeclined {
                    code: "AUTH_NOT_FOUND".to_string(),
                    message: match outcome {
                        Some(_) => "authorization was declined by the acquirer".to_string(),
                        None => "authorization was not completed at the acquirer".to_string(),
                    },
                };
                payment.fail_authorize(ErrorCategory::BankDeclined)?;
                payment.next_retry_at = None;
                self.payments
                    .update(&mut tx, &payment, expected)
                    .await
                    .map_err(GatewayError::from)?;
                if let Some(key) = idem_key.as_deref() {
                    let snapshot = ReplaySnapshot::failure(&err);
                    self.idempotency
                        .complete(
                            &mut tx,
                            OperationType::Authorize,
                            key,
                            IdempotencyStatus::Failed,
                            &snapshot.to_value()?,
                        )
                        .await
                        .map_err(GatewayError::from)?;
                }
                commit(tx).await?;
                info!(payment_id = %payment_id, "Reconciled stranded authorization as AUTH_FAILED");
                Ok(())
            }
        }
    }

    /// A retryable `AUTH_FAILED` is reconciled, never re-sent: the
    /// original card data is gone, but the bank key of the failed
    /// attempt still identifies whatever the bank actually did with it.
    async fn reconcile_failed_authorize(
        &self,
        payment_id: PaymentId,
        idem_key: Option<String>,
    ) -> Result<()> {
        let attempt_count = {
            let mut conn = self.db.acquire().await.map_err(GatewayError::from)?;
            match self
                .payments
                .get_by_id(&mut conn, payment_id)
                .await
                .map_err(GatewayError::from)?
            {
                Some(p) => p.attempt_count,
                None => return Ok(()),
            }
        };
        let bank_key = bank_idempotency_key(OperationType::Authorize, payment_id, attempt_count);
        let lookup = self.bank.get_authorization(&bank_key).await;

        let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
        let mut payment = match self
            .payments
            .get_by_id_for_update(&mut tx, payment_id)
            .await
            .map_err(GatewayError::from)?
        {
            Some(p) => p,
            None => return Ok(()),
        };
        if payment.status != paygate_types::PaymentStatus::AuthFailed {
            return Ok(());
        }
        let expected = payment.version;

        match lookup {
            Err(e) if e.is_retryable() => {
                payment.next_retry_at = Some(Utc::now() + self.backoff_after(&payment));
                self.payments
                    .update(&mut tx, &payment, expected)
                    .await
                    .map_err(GatewayError::from)?;
                commit(tx).await?;
                warn!(payment_id = %payment_id, error = %e, "Authorize reconciliation deferred");
                Ok(())
            }
            Err(e) => {
                warn!(payment_id = %payment_id, error = %e, "Authorize reconciliation read failed");
                Ok(())
            }
            Ok(Some(status)) if status.approved => {
                payment.begin_authorize()?;
                payment.complete_authorize(status.auth_id, status.expires_at)?;
                let payment = self
                    .payments
                    .update(&mut tx, &payment, expected)
                    .await
                    .map_err(GatewayError::from)?;
                if let Some(key) = idem_key.as_deref() {
                    let snapshot = ReplaySnapshot::success(&payment)?;
                    self.idempotency
                        .complete(
                            &mut tx,
                            OperationType::Authorize,
                            key,
                            IdempotencyStatus::Succeeded,
                            &snapshot.to_value()?,
                        )
                        .await
                        .map_err(GatewayError::from)?;
                }
                commit(tx).await?;
                info!(payment_id = %payment_id, "Failed authorization recovered as AUTHORIZED");
                Ok(())
            }
            Ok(outcome) => {
                let err = GatewayError::BankDeclined {
                    code: "AUTH_NOT_FOUND".to_string(),
                    message: match outcome {
                        Some(_) => "authorization was declined by the acquirer".to_string(),
                        None => "authorization was not completed at the acquirer".to_string(),
                    },
                };
                payment.begin_authorize()?;
                payment.fail_authorize(ErrorCategory::BankDeclined)?;
                payment.next_retry_at = None;
                self.payments
                    .update(&mut tx, &payment, expected)
                    .await
                    .map_err(GatewayError::from)?;
                if let Some(key) = idem_key.as_deref() {
                    let snapshot = ReplaySnapshot::failure(&err);
                    self.idempotency
                        .complete(
                            &mut tx,
                            OperationType::Authorize,
                            key,
                            IdempotencyStatus::Failed,
                            &snapshot.to_value()?,
                        )
                        .await
                        .map_err(GatewayError::from)?;
                }
                commit(tx).await?;
                info!(payment_id = %payment_id, "Failed authorization settled as non-retryable");
                Ok(())
            }
        }
    }

    /// Void an aged authorization on behalf of the expiration worker.
    pub async fn expire_payment(&self, payment_id: PaymentId) -> Result<()> {
        let op = OperationType::Void;
        let idem_key = format!("{EXPIRE_KEY_PREFIX}{payment_id}");
        let body = serde_json::json!({ "payment_id": payment_id, "reason": "expiration" });
        let request_fingerprint = fingerprint(&body)?;

        let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
        match self.claim(&mut tx, op, &idem_key, &request_fingerprint).await {
            Ok(Claimed::Fresh) => {}
            Ok(Claimed::Replay(_)) => return Ok(()),
            // Another worker instance is already on it.
            Err(GatewayError::DuplicateInFlight { .. }) => return Ok(()),
            Err(e) => return Err(e),
        }
        let mut payment = self.lock_payment(&mut tx, payment_id).await?;
        if payment.status != paygate_types::PaymentStatus::Authorized
            || payment.expires_at.map_or(true, |t| t > Utc::now())
        {
            return Ok(());
        }
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
            .attach_payment(&mut tx, op, &idem_key, payment.id)
            .await
            .map_err(GatewayError::from)?;
        commit(tx).await?;

        info!(payment_id = %payment_id, "Expiring aged authorization");

        let result = self.call_void(&payment).await.map(|response| BankSuccess::Void {
            response,
            mark_expired: true,
        });
        match self.finish(op, payment.id, Some(&idem_key), result).await {
            Ok(_) => Ok(()),
            Err(_) => Ok(()),
        }
    }
}
