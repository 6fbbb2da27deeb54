//! Commands accepted by the orchestration services
//!
//! The serialized form of a command (minus the idempotency key, which
//! travels as a header) is what gets fingerprinted, so field names here
//! are part of the idempotency contract.

use serde::Serialize;

use paygate_types::{GatewayError, PaymentId, Result};

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeCommand {
    #[serde(skip)]
    pub idempotency_key: String,
    pub order_id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    pub card_number: String,
    pub cvv: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureCommand {
    #[serde(skip)]
    pub idempotency_key: String,
    pub payment_id: PaymentId,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoidCommand {
    #[serde(skip)]
    pub idempotency_key: String,
    pub payment_id: PaymentId,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundCommand {
    #[serde(skip)]
    pub idempotency_key: String,
    pub payment_id: PaymentId,
    pub amount_cents: i64,
}

fn require_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(GatewayError::validation(
            "idempotency_key",
            "Idempotency-Key header is required",
        ));
    }
    if key.len() > 255 {
        return Err(GatewayError::validation(
            "idempotency_key",
            "idempotency key too long",
        ));
    }
    Ok(())
}

fn require_positive_amount(amount_cents: i64) -> Result<()> {
    if amount_cents <= 0 {
        return Err(GatewayError::validation(
            "amount_cents",
            "amount must be positive",
        ));
    }
    Ok(())
}

impl AuthorizeCommand {
    pub fn validate(&self) -> Result<()> {
        require_key(&self.idempotency_key)?;
        if self.order_id.is_empty() {
            return Err(GatewayError::validation("order_id", "order id is required"));
        }
        if self.customer_id.is_empty() {
            return Err(GatewayError::validation(
                "customer_id",
                "customer id is required",
            ));
        }
        require_positive_amount(self.amount_cents)?;
        let digits = self.card_number.len();
        if !(12..=19).contains(&digits) || !self.card_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(GatewayError::validation(
                "card_number",
                "card number must be 12-19 digits",
            ));
        }
        if !(3..=4).contains(&self.cvv.len()) || !self.cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(GatewayError::validation("cvv", "cvv must be 3-4 digits"));
        }
        if !(1..=12).contains(&self.expiry_month) {
            return Err(GatewayError::validation(
                "expiry_month",
                "expiry month must be 1-12",
            ));
        }
        if self.expiry_year < 2000 {
            return Err(GatewayError::validation(
                "expiry_year",
                "expiry year must be a four-digit year",
            ));
        }
        Ok(())
    }
}

impl CaptureCommand {
    pub fn validate(&self) -> Result<()> {
        require_key(&self.idempotency_key)?;
        require_positive_amount(self.amount_cents)
    }
}

impl VoidCommand {
    pub fn validate(&self) -> Result<()> {
        require_key(&self.idempotency_key)
    }
}

impl RefundCommand {
    pub fn validate(&self) -> Result<()> {
        require_key(&self.idempotency_key)?;
        require_positive_amount(self.amount_cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;

    fn authorize() -> AuthorizeCommand {
        AuthorizeCommand {
            idempotency_key: "k1".to_string(),
            order_id: "o1".to_string(),
            customer_id: "c1".to_string(),
            amount_cents: 5000,
            card_number: "4111111111111111".to_string(),
            cvv: "123".to_string(),
            expiry_month: 12,
            expiry_year: 2030,
        }
    }

    #[test]
    fn valid_authorize_passes() {
        authorize().validate().unwrap();
    }

    #[test]
    fn rejects_bad_card_fields() {
        let mut cmd = authorize();
        cmd.card_number = "4111".to_string();
        assert!(cmd.validate().is_err());

        let mut cmd = authorize();
        cmd.cvv = "12a".to_string();
        assert!(cmd.validate().is_err());

        let mut cmd = authorize();
        cmd.expiry_month = 13;
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn rejects_missing_key_and_bad_amount() {
        let mut cmd = authorize();
        cmd.idempotency_key = String::new();
        assert!(cmd.validate().is_err());

        let mut cmd = authorize();
        cmd.amount_cents = 0;
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn fingerprint_excludes_idempotency_key() {
        let a = authorize();
        let mut b = authorize();
        b.idempotency_key = "another-key".to_string();
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn fingerprint_sees_body_changes() {
        let a = authorize();
        let mut b = authorize();
        b.amount_cents = 5001;
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }
}
