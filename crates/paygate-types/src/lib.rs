//! Paygate Foundation Types
//!
//! Pure domain layer for the payment gateway:
//!
//! - **Payment aggregate**: the authoritative record of a card payment
//!   and its state machine (authorize → capture → refund, void, expire)
//! - **Error taxonomy**: stable categories and codes that drive retry,
//!   replay, and HTTP mapping decisions everywhere else in the system
//! - **Idempotency types**: record and claim-outcome shapes shared by
//!   the store and the orchestration services
//!
//! No I/O happens here. Repositories own `version` bumps; services own
//! clocks for retry scheduling.

pub mod error;
pub mod idempotency;
pub mod payment;

pub use error::{ErrorCategory, GatewayError, Result};
pub use idempotency::{ClaimOutcome, IdempotencyRecord, IdempotencyStatus};
pub use payment::{OperationType, Payment, PaymentId, PaymentStatus};
