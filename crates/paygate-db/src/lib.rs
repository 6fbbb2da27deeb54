//! Paygate Database Layer
//!
//! PostgreSQL persistence for the payment gateway.
//!
//! # Repository Pattern
//!
//! Each table has its own repository. Repository methods take a
//! `&mut PgConnection`, so the same interface serves pooled connections
//! and open transactions; orchestration code locks aggregate rows with
//! `SELECT ... FOR UPDATE` before mutating and writes go through a
//! compare-and-set on `payments.version`.

pub mod config;
pub mod error;
pub mod models;
pub mod repos;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use tracing::info;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use models::{DbIdempotencyRecord, DbPayment};
pub use repos::{IdempotencyRepo, PaymentRepo};

/// Database connection pool
pub struct Database {
    /// PostgreSQL connection pool
    pub pg: PgPool,
}

impl Database {
    /// Connect to PostgreSQL
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to PostgreSQL: {}", config.url_masked());

        let pg = PgPoolOptions::new()
            .max_connections(config.max_open_conns)
            .min_connections(config.max_idle_conns)
            .max_lifetime(config.conn_max_lifetime())
            .idle_timeout(config.conn_max_idle_time())
            .connect(&config.url())
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!("Connected to PostgreSQL");

        Ok(Self { pg })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pg)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> DbResult<bool> {
        let ok = sqlx::query("SELECT 1").fetch_one(&self.pg).await.is_ok();
        Ok(ok)
    }

    /// Begin a transaction
    pub async fn begin(&self) -> DbResult<sqlx::Transaction<'static, Postgres>> {
        Ok(self.pg.begin().await?)
    }

    /// Acquire a pooled connection for non-transactional reads
    pub async fn acquire(&self) -> DbResult<sqlx::pool::PoolConnection<Postgres>> {
        Ok(self.pg.acquire().await?)
    }

    /// Create repository instances
    pub fn payment_repo(&self) -> PaymentRepo {
        PaymentRepo::new()
    }

    pub fn idempotency_repo(&self) -> IdempotencyRepo {
        IdempotencyRepo::new()
    }
}
