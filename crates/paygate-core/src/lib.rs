//! Paygate Orchestration
//!
//! The transactional heart of the gateway: commands come in, a
//! pre-call transaction makes the attempt durable, the bank is called
//! outside any transaction, and a post-call transaction records the
//! outcome together with the idempotency record's terminal state.
//! Recovery entry points let the background workers drive stuck
//! payments to rest using the same machinery.

pub mod commands;
pub mod fingerprint;
pub mod outcome;
pub mod query;
pub mod recovery;
pub mod service;

pub use commands::{AuthorizeCommand, CaptureCommand, RefundCommand, VoidCommand};
pub use fingerprint::{bank_idempotency_key, canonical_json, fingerprint};
pub use outcome::{error_body, CommandOutcome, ReplaySnapshot};
pub use query::QueryService;
pub use service::{PaymentService, CURRENCY, EXPIRE_KEY_PREFIX};
