//! Database error types

use paygate_types::GatewayError;
use thiserror::Error;

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Duplicate order id: {order_id}")]
    DuplicateOrder { order_id: String },

    #[error("Version conflict on payment {payment_id}")]
    VersionConflict { payment_id: String },

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<DbError> for GatewayError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::DuplicateOrder { order_id } => GatewayError::OrderAlreadyExists { order_id },
            DbError::VersionConflict { payment_id } => GatewayError::VersionConflict { payment_id },
            other => GatewayError::internal(other.to_string()),
        }
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Whether a sqlx error is a unique-constraint violation (Postgres 23505)
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_types::ErrorCategory;

    #[test]
    fn duplicate_order_maps_to_conflict() {
        let err: GatewayError = DbError::DuplicateOrder {
            order_id: "o1".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "ORDER_ALREADY_EXISTS");
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn generic_errors_map_to_internal() {
        let err: GatewayError = DbError::Connection("refused".to_string()).into();
        assert_eq!(err.category(), ErrorCategory::Internal);
    }
}
