//! Retry wrapper over the bank client
//!
//! Retries `BANK_TRANSIENT` and `BANK_UNKNOWN` failures with
//! exponential backoff plus uniform jitter. Non-retryable errors pass
//! through untouched; exhaustion is reported as `MAX_RETRIES_EXCEEDED`
//! with the final error (and its category) preserved inside. Dropping
//! the future cancels any in-flight sleep or call.

use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use paygate_types::{GatewayError, Result};

use crate::client::{
    BankAuthorizationStatus, BankAuthorizeRequest, BankAuthorizeResponse, BankCaptureRequest,
    BankCaptureResponse, BankClient, BankRefundRequest, BankRefundResponse, BankVoidRequest,
    BankVoidResponse,
};

/// Retry configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    /// First backoff delay in milliseconds; doubles per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum total call attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the next attempt, not including jitter
    pub fn backoff(&self, completed_attempts: u32) -> Duration {
        let exp = completed_attempts.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << exp))
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..1000))
}

/// A [`BankClient`] that retries retryable failures
pub struct RetryingBankClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: BankClient> RetryingBankClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempts = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempts += 1;
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempts >= max_attempts {
                        return Err(GatewayError::MaxRetriesExceeded {
                            attempts,
                            source: Box::new(e),
                        });
                    }
                    let delay = self.policy.backoff(attempts) + jitter();
                    warn!(
                        operation,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Bank call failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl<C: BankClient> BankClient for RetryingBankClient<C> {
    async fn authorize(&self, req: &BankAuthorizeRequest) -> Result<BankAuthorizeResponse> {
        self.run("authorize", || self.inner.authorize(req)).await
    }

    async fn capture(&self, req: &BankCaptureRequest) -> Result<BankCaptureResponse> {
        self.run("capture", || self.inner.capture(req)).await
    }

    async fn void(&self, req: &BankVoidRequest) -> Result<BankVoidResponse> {
        self.run("void", || self.inner.void(req)).await
    }

    async fn refund(&self, req: &BankRefundRequest) -> Result<BankRefundResponse> {
        self.run("refund", || self.inner.refund(req)).await
    }

    async fn get_authorization(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<BankAuthorizationStatus>> {
        self.run("get_authorization", || {
            self.inner.get_authorization(idempotency_key)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CardDetails;
    use paygate_types::ErrorCategory;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted bank: pops one result per call, counts calls
    struct ScriptedBank {
        calls: AtomicU32,
        script: Mutex<Vec<Result<BankAuthorizeResponse>>>,
    }

    impl ScriptedBank {
        fn new(script: Vec<Result<BankAuthorizeResponse>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn ok_auth() -> BankAuthorizeResponse {
        BankAuthorizeResponse {
            auth_id: "auth-1".to_string(),
            expires_at: None,
        }
    }

    fn transient() -> GatewayError {
        GatewayError::BankTransient {
            message: "503".to_string(),
        }
    }

    #[async_trait]
    impl BankClient for ScriptedBank {
        async fn authorize(&self, _req: &BankAuthorizeRequest) -> Result<BankAuthorizeResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Err(transient())
            } else {
                script.remove(0)
            }
        }

        async fn capture(&self, _req: &BankCaptureRequest) -> Result<BankCaptureResponse> {
            unimplemented!("not used in these tests")
        }

        async fn void(&self, _req: &BankVoidRequest) -> Result<BankVoidResponse> {
            unimplemented!("not used in these tests")
        }

        async fn refund(&self, _req: &BankRefundRequest) -> Result<BankRefundResponse> {
            unimplemented!("not used in these tests")
        }

        async fn get_authorization(
            &self,
            _idempotency_key: &str,
        ) -> Result<Option<BankAuthorizationStatus>> {
            unimplemented!("not used in these tests")
        }
    }

    fn auth_request() -> BankAuthorizeRequest {
        BankAuthorizeRequest {
            idempotency_key: "k1".to_string(),
            amount_cents: 5000,
            currency: "USD".to_string(),
            card: CardDetails {
                card_number: "4111111111111111".to_string(),
                cvv: "123".to_string(),
                expiry_month: 12,
                expiry_year: 2030,
            },
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: 1000,
            max_retries,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let bank = ScriptedBank::new(vec![Err(transient()), Err(transient()), Ok(ok_auth())]);
        let client = RetryingBankClient::new(bank, policy(3));
        let response = client.authorize(&auth_request()).await.unwrap();
        assert_eq!(response.auth_id, "auth-1");
        assert_eq!(client.inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_makes_exactly_max_retries_calls() {
        let bank = ScriptedBank::new(vec![]);
        let client = RetryingBankClient::new(bank, policy(3));
        let err = client.authorize(&auth_request()).await.unwrap_err();
        assert_eq!(client.inner.calls(), 3);
        assert_eq!(err.error_code(), "MAX_RETRIES_EXCEEDED");
        assert_eq!(err.category(), ErrorCategory::BankTransient);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_returns_immediately() {
        let bank = ScriptedBank::new(vec![Err(GatewayError::BankDeclined {
            code: "51".to_string(),
            message: "insufficient funds".to_string(),
        })]);
        let client = RetryingBankClient::new(bank, policy(5));
        let err = client.authorize(&auth_request()).await.unwrap_err();
        assert_eq!(client.inner.calls(), 1);
        assert_eq!(err.error_code(), "BANK_DECLINED");
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_exponentially() {
        let bank = ScriptedBank::new(vec![Err(transient()), Err(transient()), Ok(ok_auth())]);
        let client = RetryingBankClient::new(bank, policy(3));
        let started = tokio::time::Instant::now();
        client.authorize(&auth_request()).await.unwrap();
        let elapsed = started.elapsed();
        // Two sleeps: 1s + 2s of backoff, each with < 1s of jitter.
        assert!(elapsed >= Duration::from_secs(3), "elapsed: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "elapsed: {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_further_calls() {
        let bank = ScriptedBank::new(vec![]);
        let client = RetryingBankClient::new(
            bank,
            RetryPolicy {
                base_delay_ms: 10_000,
                max_retries: 10,
            },
        );
        let request = auth_request();
        let result =
            tokio::time::timeout(Duration::from_secs(1), client.authorize(&request)).await;
        assert!(result.is_err(), "expected the deadline to fire first");
        assert_eq!(client.inner.calls(), 1);

        // The dropped future schedules nothing further.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(client.inner.calls(), 1);
    }

    #[test]
    fn backoff_schedule() {
        let policy = policy(5);
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff(3), Duration::from_millis(4000));
    }
}
