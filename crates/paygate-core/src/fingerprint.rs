//! Request fingerprints and bank idempotency keys
//!
//! A fingerprint distinguishes "same key, same request" from "same key,
//! different request": the body is canonical-JSON-encoded (keys sorted,
//! no whitespace) and hashed. The bank key ties one logical attempt
//! (one pre-call commit) to one observable effect at the acquirer.

use serde::Serialize;
use sha2::{Digest, Sha256};

use paygate_types::{GatewayError, OperationType, PaymentId, Result};

/// Canonical JSON encoding: object keys sorted, no whitespace.
///
/// `serde_json` maps are ordered, so one round trip through `Value`
/// normalizes key order; `to_string` emits no whitespace.
pub fn canonical_json(value: &serde_json::Value) -> String {
    value.to_string()
}

/// Stable hash of a request body
pub fn fingerprint<T: Serialize>(body: &T) -> Result<String> {
    let value = serde_json::to_value(body)
        .map_err(|e| GatewayError::internal(format!("failed to encode request body: {e}")))?;
    let canonical = canonical_json(&value);
    Ok(sha256_hex(canonical.as_bytes()))
}

/// Idempotency key presented to the bank.
///
/// Stable across wire-level retries of the same logical attempt: the
/// attempt count is the one recorded at the pre-call commit.
pub fn bank_idempotency_key(
    operation_type: OperationType,
    payment_id: PaymentId,
    attempt_count: i32,
) -> String {
    let material = format!("{}:{}:{}", operation_type.as_str(), payment_id, attempt_count);
    sha256_hex(material.as_bytes())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_and_strips_whitespace() {
        let a: serde_json::Value = serde_json::from_str(r#"{ "b": 1,  "a": [1, 2] }"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"a":[1,2],"b":1}"#).unwrap();
        assert_eq!(canonical_json(&a), r#"{"a":[1,2],"b":1}"#);
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn fingerprint_ignores_formatting_but_not_content() {
        let a = json!({"order_id": "o1", "amount_cents": 5000});
        let b: serde_json::Value =
            serde_json::from_str(r#"{ "amount_cents": 5000, "order_id": "o1" }"#).unwrap();
        let c = json!({"order_id": "o1", "amount_cents": 5001});
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&c).unwrap());
    }

    #[test]
    fn bank_key_is_stable_per_attempt() {
        let id: PaymentId = "7c9e6679-7425-40de-944b-e07fc1f90ae7".parse().unwrap();
        let k1 = bank_idempotency_key(OperationType::Authorize, id, 1);
        let k1_again = bank_idempotency_key(OperationType::Authorize, id, 1);
        let k2 = bank_idempotency_key(OperationType::Authorize, id, 2);
        let other_op = bank_idempotency_key(OperationType::Capture, id, 1);
        assert_eq!(k1, k1_again);
        assert_ne!(k1, k2);
        assert_ne!(k1, other_op);
        assert_eq!(k1.len(), 64);
    }
}
