//! HTTP handlers

pub mod health;
pub mod payments;
pub mod query;

use axum::http::HeaderMap;

use paygate_types::{GatewayError, Result};

/// Commands require the `Idempotency-Key` header
pub(crate) fn require_idempotency_key(headers: &HeaderMap) -> Result<String> {
    let key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if key.is_empty() {
        return Err(GatewayError::validation(
            "idempotency_key",
            "Idempotency-Key header is required",
        ));
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_header_is_a_validation_error() {
        let headers = HeaderMap::new();
        let err = require_idempotency_key(&headers).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn present_header_is_returned_trimmed() {
        let mut headers = HeaderMap::new();
        headers.insert("Idempotency-Key", HeaderValue::from_static("  k1  "));
        assert_eq!(require_idempotency_key(&headers).unwrap(), "k1");
    }
}
