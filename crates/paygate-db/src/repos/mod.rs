//! Repositories for the payment gateway tables

pub mod idempotency;
pub mod payment;

pub use idempotency::IdempotencyRepo;
pub use payment::PaymentRepo;
