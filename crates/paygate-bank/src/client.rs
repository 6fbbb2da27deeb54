//! Bank client
//!
//! Logical acquirer operations behind a trait so the orchestration
//! layer, the retry wrapper, and tests can share one seam. The HTTP
//! implementation classifies transport and protocol failures into the
//! gateway error taxonomy:
//!
//! - connect failures (request never left the process) → `BANK_TRANSIENT`
//! - timeouts and undecodable responses (request may have been
//!   processed) → `BANK_UNKNOWN`
//! - HTTP 5xx → `BANK_TRANSIENT`
//! - HTTP 4xx → `BANK_DECLINED` with the bank's decline code

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use paygate_types::{GatewayError, Result};

/// Bank client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankClientConfig {
    /// Base URL of the acquirer API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Connect timeout in seconds
    #[serde(default = "default_conn_timeout")]
    pub conn_timeout_secs: u64,

    /// Per-call timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BankClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            conn_timeout_secs: default_conn_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BankClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_base_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_conn_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

// ============================================================================
// Requests & Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardDetails {
    pub card_number: String,
    pub cvv: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct BankAuthorizeRequest {
    pub idempotency_key: String,
    pub amount_cents: i64,
    pub currency: String,
    pub card: CardDetails,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankAuthorizeResponse {
    pub auth_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BankCaptureRequest {
    pub idempotency_key: String,
    pub auth_id: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankCaptureResponse {
    pub capture_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BankVoidRequest {
    pub idempotency_key: String,
    pub auth_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankVoidResponse {
    pub void_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BankRefundRequest {
    pub idempotency_key: String,
    pub capture_id: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BankRefundResponse {
    pub refund_id: String,
}

/// Read-side view of an authorization, used for reconciliation
#[derive(Debug, Clone, Deserialize)]
pub struct BankAuthorizationStatus {
    pub auth_id: String,
    pub approved: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Decline payload the acquirer returns on 4xx
#[derive(Debug, Deserialize)]
struct BankDeclineBody {
    code: Option<String>,
    message: Option<String>,
}

// ============================================================================
// Trait
// ============================================================================

/// Logical acquirer operations.
///
/// Every mutating call carries a derived idempotency key; the bank
/// dedupes on it, which is what makes blind retries safe.
#[async_trait]
pub trait BankClient: Send + Sync {
    async fn authorize(&self, req: &BankAuthorizeRequest) -> Result<BankAuthorizeResponse>;

    async fn capture(&self, req: &BankCaptureRequest) -> Result<BankCaptureResponse>;

    async fn void(&self, req: &BankVoidRequest) -> Result<BankVoidResponse>;

    async fn refund(&self, req: &BankRefundRequest) -> Result<BankRefundResponse>;

    /// Look up an authorization by the idempotency key it was submitted
    /// under. `None` means the bank never processed the request.
    async fn get_authorization(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<BankAuthorizationStatus>>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

pub struct HttpBankClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBankClient {
    pub fn new(config: &BankClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.conn_timeout_secs))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        idempotency_key: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header("Idempotency-Key", idempotency_key)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;
        decode_response(response).await
    }
}

#[async_trait]
impl BankClient for HttpBankClient {
    async fn authorize(&self, req: &BankAuthorizeRequest) -> Result<BankAuthorizeResponse> {
        self.post("/authorizations", &req.idempotency_key, req).await
    }

    async fn capture(&self, req: &BankCaptureRequest) -> Result<BankCaptureResponse> {
        self.post("/captures", &req.idempotency_key, req).await
    }

    async fn void(&self, req: &BankVoidRequest) -> Result<BankVoidResponse> {
        self.post("/voids", &req.idempotency_key, req).await
    }

    async fn refund(&self, req: &BankRefundRequest) -> Result<BankRefundResponse> {
        self.post("/refunds", &req.idempotency_key, req).await
    }

    async fn get_authorization(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<BankAuthorizationStatus>> {
        let url = format!("{}/authorizations/by-key/{}", self.base_url, idempotency_key);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode_response(response).await.map(Some)
    }
}

/// Map a reqwest transport error into the taxonomy.
///
/// A connect error means the request never left the process, so a blind
/// retry is safe; anything that may have reached the bank is unknown.
fn classify_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_connect() {
        GatewayError::BankTransient {
            message: format!("connect error: {e}"),
        }
    } else if e.is_timeout() {
        GatewayError::BankUnknown {
            message: format!("timed out awaiting bank response: {e}"),
        }
    } else if e.is_request() {
        GatewayError::BankTransient {
            message: format!("request error: {e}"),
        }
    } else {
        GatewayError::BankUnknown {
            message: e.to_string(),
        }
    }
}

async fn decode_response<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if status.is_server_error() {
        return Err(GatewayError::BankTransient {
            message: format!("bank returned {status}"),
        });
    }

    if status.is_client_error() {
        let decline = response.json::<BankDeclineBody>().await.unwrap_or(BankDeclineBody {
            code: None,
            message: None,
        });
        return Err(GatewayError::BankDeclined {
            code: decline.code.unwrap_or_else(|| status.as_u16().to_string()),
            message: decline
                .message
                .unwrap_or_else(|| "declined by acquirer".to_string()),
        });
    }

    // A success status with an unreadable body: the operation may have
    // been processed, so surface it as indeterminate.
    response.json::<T>().await.map_err(|e| GatewayError::BankUnknown {
        message: format!("unreadable bank response: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_types::ErrorCategory;

    #[test]
    fn base_url_is_normalized() {
        let client = HttpBankClient::new(&BankClientConfig {
            base_url: "http://bank.test/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.base_url, "http://bank.test");
    }

    #[tokio::test]
    async fn connect_failure_is_transient() {
        // Nothing listens on this port; reqwest fails at connect time.
        let client = HttpBankClient::new(&BankClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            conn_timeout_secs: 1,
            request_timeout_secs: 1,
        })
        .unwrap();
        let err = client
            .authorize(&BankAuthorizeRequest {
                idempotency_key: "k".to_string(),
                amount_cents: 100,
                currency: "USD".to_string(),
                card: CardDetails {
                    card_number: "4111111111111111".to_string(),
                    cvv: "123".to_string(),
                    expiry_month: 12,
                    expiry_year: 2030,
                },
            })
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BankTransient);
    }
}
