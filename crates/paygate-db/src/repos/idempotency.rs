//! Idempotency repository
//!
//! The claim is atomic: a unique index on `(operation_type, key)` plus
//! insert-or-select guarantees exactly one caller observes
//! [`ClaimOutcome::Fresh`] for a given slot.

use sqlx::PgConnection;

use paygate_types::{ClaimOutcome, IdempotencyRecord, IdempotencyStatus, OperationType, PaymentId};

use crate::error::DbResult;
use crate::models::DbIdempotencyRecord;

pub struct IdempotencyRepo;

impl IdempotencyRepo {
    pub fn new() -> Self {
        Self
    }

    /// Claim the `(operation_type, key)` slot.
    ///
    /// Inserts an `IN_FLIGHT` record if the slot is free; otherwise the
    /// existing record is classified against the caller's fingerprint.
    pub async fn claim(
        &self,
        conn: &mut PgConnection,
        operation_type: OperationType,
        key: &str,
        request_fingerprint: &str,
    ) -> DbResult<(IdempotencyRecord, ClaimOutcome)> {
        let inserted = sqlx::query_as::<_, DbIdempotencyRecord>(
            r#"
            INSERT INTO idempotency_records (operation_type, key, request_fingerprint, status)
            VALUES ($1, $2, $3, 'IN_FLIGHT')
            ON CONFLICT (operation_type, key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(operation_type.as_str())
        .bind(key)
        .bind(request_fingerprint)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = inserted {
            return Ok((row.try_into()?, ClaimOutcome::Fresh));
        }

        let existing = sqlx::query_as::<_, DbIdempotencyRecord>(
            "SELECT * FROM idempotency_records WHERE operation_type = $1 AND key = $2",
        )
        .bind(operation_type.as_str())
        .bind(key)
        .fetch_one(&mut *conn)
        .await?;

        let record: IdempotencyRecord = existing.try_into()?;
        let outcome = classify_existing(&record, request_fingerprint);
        Ok((record, outcome))
    }

    /// Record the target payment once it is known
    pub async fn attach_payment(
        &self,
        conn: &mut PgConnection,
        operation_type: OperationType,
        key: &str,
        payment_id: PaymentId,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE idempotency_records SET payment_id = $3 WHERE operation_type = $1 AND key = $2",
        )
        .bind(operation_type.as_str())
        .bind(key)
        .bind(payment_id.0)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Transition an `IN_FLIGHT` record to its terminal status and store
    /// the replay snapshot.
    pub async fn complete(
        &self,
        conn: &mut PgConnection,
        operation_type: OperationType,
        key: &str,
        status: IdempotencyStatus,
        response_snapshot: &serde_json::Value,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE idempotency_records
            SET status = $3, response_snapshot = $4, completed_at = NOW()
            WHERE operation_type = $1 AND key = $2 AND status = 'IN_FLIGHT'
            "#,
        )
        .bind(operation_type.as_str())
        .bind(key)
        .bind(status.as_str())
        .bind(response_snapshot)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Latest record for a payment and operation; used by the retry
    /// worker to re-drive a failed payment under its original key.
    pub async fn find_for_payment(
        &self,
        conn: &mut PgConnection,
        payment_id: PaymentId,
        operation_type: OperationType,
    ) -> DbResult<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, DbIdempotencyRecord>(
            r#"
            SELECT * FROM idempotency_records
            WHERE payment_id = $1 AND operation_type = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(payment_id.0)
        .bind(operation_type.as_str())
        .fetch_optional(&mut *conn)
        .await?;
        row.map(TryInto::try_into).transpose()
    }
}

impl Default for IdempotencyRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify an already-claimed slot against the caller's fingerprint
fn classify_existing(record: &IdempotencyRecord, request_fingerprint: &str) -> ClaimOutcome {
    if record.request_fingerprint != request_fingerprint {
        ClaimOutcome::FingerprintMismatch
    } else if record.status == IdempotencyStatus::InFlight {
        ClaimOutcome::InFlightMatch
    } else {
        ClaimOutcome::CompletedMatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(status: IdempotencyStatus, fingerprint: &str) -> IdempotencyRecord {
        IdempotencyRecord {
            operation_type: OperationType::Authorize,
            key: "k1".to_string(),
            request_fingerprint: fingerprint.to_string(),
            payment_id: None,
            status,
            response_snapshot: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn mismatched_fingerprint_wins_over_status() {
        let rec = record(IdempotencyStatus::Succeeded, "fp-a");
        assert_eq!(
            classify_existing(&rec, "fp-b"),
            ClaimOutcome::FingerprintMismatch
        );
    }

    #[test]
    fn in_flight_match() {
        let rec = record(IdempotencyStatus::InFlight, "fp-a");
        assert_eq!(classify_existing(&rec, "fp-a"), ClaimOutcome::InFlightMatch);
    }

    #[test]
    fn completed_match_for_both_terminal_statuses() {
        for status in [IdempotencyStatus::Succeeded, IdempotencyStatus::Failed] {
            let rec = record(status, "fp-a");
            assert_eq!(
                classify_existing(&rec, "fp-a"),
                ClaimOutcome::CompletedMatch
            );
        }
    }
}
