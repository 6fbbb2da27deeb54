//! Retry worker
//!
//! Each cycle runs two passes:
//!
//! 1. payments in a retryable `*_FAILED` state whose `next_retry_at`
//!    has come due are re-driven through the orchestration pipeline
//! 2. payments stranded in `*ING` longer than the grace window are
//!    reconciled against the bank
//!
//! Selection uses `FOR UPDATE SKIP LOCKED` in a short transaction and
//! the locks are released before driving each payment; the per-payment
//! state re-check under a fresh row lock makes a double-selection by a
//! racing instance a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use paygate_core::PaymentService;
use paygate_db::Database;
use paygate_types::{GatewayError, PaymentId, Result};

use crate::WorkerConfig;

pub struct RetryWorker {
    db: Arc<Database>,
    service: Arc<PaymentService>,
    config: WorkerConfig,
}

impl RetryWorker {
    pub fn new(db: Arc<Database>, service: Arc<PaymentService>, config: WorkerConfig) -> Self {
        Self {
            db,
            service,
            config,
        }
    }

    /// Main loop; returns when the shutdown channel fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval_secs,
            batch_size = self.config.batch_size,
            grace_window_secs = self.grace_window_secs(),
            "Retry worker started"
        );
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Retry worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.process_cycle().await {
                        error!(error = %e, "Retry worker cycle failed");
                    }
                }
            }
        }
    }

    async fn process_cycle(&self) -> Result<()> {
        let due = self.select_due_retries().await?;
        for payment_id in due {
            if let Err(e) = self.service.retry_payment(payment_id).await {
                warn!(payment_id = %payment_id, error = %e, "Retry attempt errored");
            }
        }

        let stranded = self.select_stranded().await?;
        for payment_id in stranded {
            if let Err(e) = self.service.reconcile_in_flight(payment_id).await {
                warn!(payment_id = %payment_id, error = %e, "Reconciliation errored");
            }
        }
        Ok(())
    }

    async fn select_due_retries(&self) -> Result<Vec<PaymentId>> {
        let repo = self.db.payment_repo();
        let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
        let payments = repo
            .list_retryable(&mut tx, Utc::now(), self.config.batch_size)
            .await
            .map_err(GatewayError::from)?;
        tx.commit()
            .await
            .map_err(|e| GatewayError::internal(e.to_string()))?;
        Ok(payments.into_iter().map(|p| p.id).collect())
    }

    fn grace_window_secs(&self) -> u64 {
        self.config.grace_window_secs.unwrap_or(60)
    }

    async fn select_stranded(&self) -> Result<Vec<PaymentId>> {
        let cutoff =
            Utc::now() - chrono::Duration::seconds(self.grace_window_secs().min(i64::MAX as u64) as i64);
        let repo = self.db.payment_repo();
        let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
        let payments = repo
            .list_stuck_in_flight(&mut tx, cutoff, self.config.batch_size)
            .await
            .map_err(GatewayError::from)?;
        tx.commit()
            .await
            .map_err(|e| GatewayError::internal(e.to_string()))?;
        Ok(payments.into_iter().map(|p| p.id).collect())
    }
}
