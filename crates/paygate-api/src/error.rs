//! API error handling
//!
//! The error taxonomy maps to HTTP statuses through one pure function;
//! response bodies come from [`paygate_core::error_body`], which is the
//! same encoder used for idempotency snapshots, so live responses and
//! replays are byte-identical.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use paygate_core::error_body;
use paygate_types::{ErrorCategory, GatewayError};

/// HTTP status for an error category
pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Timeout => StatusCode::REQUEST_TIMEOUT,
        ErrorCategory::Conflict | ErrorCategory::IllegalState => StatusCode::CONFLICT,
        ErrorCategory::BankDeclined => StatusCode::PAYMENT_REQUIRED,
        ErrorCategory::BankTransient
        | ErrorCategory::BankUnknown
        | ErrorCategory::Internal
        | ErrorCategory::Expired => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// API error response
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.category());
        let body = serde_json::json!({
            "success": false,
            "error": error_body(&self.0),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_the_specified_one() {
        assert_eq!(status_for(ErrorCategory::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorCategory::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorCategory::Timeout), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(status_for(ErrorCategory::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorCategory::IllegalState), StatusCode::CONFLICT);
        assert_eq!(
            status_for(ErrorCategory::BankDeclined),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_for(ErrorCategory::BankTransient),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(ErrorCategory::BankUnknown),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(ErrorCategory::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
