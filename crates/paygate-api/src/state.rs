//! Shared application state

use std::sync::Arc;
use std::time::Duration;

use paygate_core::{PaymentService, QueryService};
use paygate_db::Database;

pub struct AppState {
    pub db: Arc<Database>,
    pub payments: Arc<PaymentService>,
    pub queries: Arc<QueryService>,
    /// Deadline applied to every command request
    pub request_timeout: Duration,
}
