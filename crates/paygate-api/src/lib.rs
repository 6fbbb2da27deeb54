//! Paygate REST API
//!
//! HTTP surface for the payment gateway:
//!
//! - `POST /payments/{authorize,capture,void,refund}` commands, keyed
//!   by the `Idempotency-Key` header
//! - `GET /payments/{id}`, `/payments/order/{order_id}`,
//!   `/payments/customer/{customer_id}` queries
//! - `GET /health`
//!
//! Responses use the `{"success", "data" | "error"}` envelope; error
//! statuses come from the taxonomy's pure category mapping; panics in
//! request tasks are recovered and rendered as `INTERNAL_ERROR`.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{status_for, ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
