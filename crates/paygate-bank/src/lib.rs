//! Paygate Acquirer Integration
//!
//! The [`BankClient`] trait is the seam between the gateway and the
//! external bank: logical Authorize/Capture/Void/Refund operations plus
//! the read-side `GetAuthorization` used for reconciliation.
//! [`HttpBankClient`] speaks the acquirer's HTTP API and classifies
//! failures into the error taxonomy; [`RetryingBankClient`] layers
//! exponential backoff with jitter over retryable categories.

pub mod client;
pub mod retry;

pub use client::{
    BankAuthorizationStatus, BankAuthorizeRequest, BankAuthorizeResponse, BankCaptureRequest,
    BankCaptureResponse, BankClient, BankClientConfig, BankRefundRequest, BankRefundResponse,
    BankVoidRequest, BankVoidResponse, CardDetails, HttpBankClient,
};
pub use retry::{RetryPolicy, RetryingBankClient};
