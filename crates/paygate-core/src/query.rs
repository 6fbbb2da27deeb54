//! Read-only payment lookups

use std::sync::Arc;

use paygate_db::{Database, PaymentRepo};
use paygate_types::{GatewayError, Payment, PaymentId, Result};

/// Bounds for customer listings
const MAX_PAGE_SIZE: i64 = 100;

pub struct QueryService {
    db: Arc<Database>,
    payments: PaymentRepo,
}

impl QueryService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            payments: db.payment_repo(),
            db,
        }
    }

    pub async fn get_payment(&self, id: PaymentId) -> Result<Payment> {
        let mut conn = self.db.acquire().await.map_err(GatewayError::from)?;
        self.payments
            .get_by_id(&mut conn, id)
            .await
            .map_err(GatewayError::from)?
            .ok_or_else(|| GatewayError::PaymentNotFound {
                payment_id: id.to_string(),
            })
    }

    pub async fn get_payment_by_order(&self, order_id: &str) -> Result<Payment> {
        let mut conn = self.db.acquire().await.map_err(GatewayError::from)?;
        self.payments
            .get_by_order_id(&mut conn, order_id)
            .await
            .map_err(GatewayError::from)?
            .ok_or_else(|| GatewayError::OrderNotFound {
                order_id: order_id.to_string(),
            })
    }

    /// Newest first; `limit` clamped to `[1, 100]`, `offset` floored at 0.
    pub async fn list_payments_by_customer(
        &self,
        customer_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Payment>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = offset.max(0);
        let mut conn = self.db.acquire().await.map_err(GatewayError::from)?;
        self.payments
            .find_by_customer_id(&mut conn, customer_id, limit, offset)
            .await
            .map_err(GatewayError::from)
    }
}
