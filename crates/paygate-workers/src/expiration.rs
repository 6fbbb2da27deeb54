//! Expiration worker
//!
//! Authorizations reserve funds on the cardholder's account; once
//! `expires_at` passes the hold is dead weight. Each cycle voids a
//! batch of lapsed authorizations at the bank under the synthesized
//! `expire:{payment_id}` idempotency key and relabels them `EXPIRED`.

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

pub struct ExpirationWorker {
    db: Arc<Database>,
    service: Arc<PaymentService>,
    config: WorkerConfig,
}

impl ExpirationWorker {
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
            "Expiration worker started"
        );
        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Expiration worker stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.process_cycle().await {
                        error!(error = %e, "Expiration worker cycle failed");
                    }
                }
            }
        }
    }

    async fn process_cycle(&self) -> Result<()> {
        let lapsed = self.select_lapsed().await?;
        for payment_id in lapsed {
            if let Err(e) = self.service.expire_payment(payment_id).await {
                warn!(payment_id = %payment_id, error = %e, "Expiration errored");
            }
        }
        Ok(())
    }

    async fn select_lapsed(&self) -> Result<Vec<PaymentId>> {
        let repo = self.db.payment_repo();
        let mut tx = self.db.begin().await.map_err(GatewayError::from)?;
        let payments = repo
            .list_expired_authorizations(&mut tx, Utc::now(), self.config.batch_size)
            .await
            .map_err(GatewayError::from)?;
        tx.commit()
            .await
            .map_err(|e| GatewayError::internal(e.to_string()))?;
        Ok(payments.into_iter().map(|p| p.id).collect())
    }
}
