//! Paygate Server
//!
//! The payment gateway in one binary: REST API, retry worker, and
//! expiration worker over a shared PostgreSQL pool and bank client.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (0.0.0.0:8080)
//! paygate-server
//!
//! # Custom config file and port
//! paygate-server --config config/production.toml --port 9090
//!
//! # Environment overrides
//! PAYGATE__DATABASE__PASSWORD=... PAYGATE__BANK_CLIENT__BASE_URL=https://acquirer.test paygate-server
//! ```

mod config;

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use paygate_api::{create_router, AppState};
use paygate_bank::{BankClient, HttpBankClient, RetryingBankClient};
use paygate_core::{PaymentService, QueryService};
use paygate_db::Database;
use paygate_workers::{ExpirationWorker, RetryWorker, WorkerConfig};

use crate::config::AppConfig;

/// Paygate - card payment gateway
#[derive(Parser, Debug)]
#[command(name = "paygate-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "PAYGATE_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "PAYGATE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PAYGATE_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PAYGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "PAYGATE_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut app_config = AppConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        app_config.server.host = host;
    }
    if let Some(port) = args.port {
        app_config.server.port = port;
    }
    if let Some(level) = args.log_level {
        app_config.logger.level = level;
    }
    if let Some(format) = args.log_format {
        app_config.logger.format = format;
    }

    init_logging(&app_config.logger);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting paygate server"
    );

    // Database
    let db = Arc::new(Database::connect(&app_config.database).await?);
    db.migrate().await?;
    if !db.health_check().await? {
        anyhow::bail!("database health check failed");
    }

    // Bank client with the retry wrapper layered on
    let bank: Arc<dyn BankClient> = Arc::new(RetryingBankClient::new(
        HttpBankClient::new(&app_config.bank_client)?,
        app_config.retry.clone(),
    ));

    // Services
    let payments = Arc::new(PaymentService::new(
        db.clone(),
        bank,
        app_config.retry.clone(),
    ));
    let queries = Arc::new(QueryService::new(db.clone()));

    // Background workers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_config = WorkerConfig {
        grace_window_secs: Some(
            app_config
                .worker
                .grace_window(app_config.bank_client.request_timeout_secs),
        ),
        ..app_config.worker.clone()
    };
    let retry_handle = tokio::spawn(
        RetryWorker::new(db.clone(), payments.clone(), worker_config.clone())
            .run(shutdown_rx.clone()),
    );
    let expiration_handle = tokio::spawn(
        ExpirationWorker::new(db.clone(), payments.clone(), worker_config).run(shutdown_rx),
    );

    // HTTP server
    let state = Arc::new(AppState {
        db: db.clone(),
        payments,
        queries,
        request_timeout: app_config.server.request_deadline(),
    });
    let app = create_router(state);
    let addr = app_config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        host = %app_config.server.host,
        port = app_config.server.port,
        "Server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the workers and wait for the in-progress batch to finish
    let _ = shutdown_tx.send(true);
    let _ = retry_handle.await;
    let _ = expiration_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing
fn init_logging(logger: &config::LoggerConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logger.level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match logger.format.as_str() {
        "json" => subscriber.with(fmt::layer().json().with_target(true)).init(),
        _ => subscriber.with(fmt::layer().with_target(true)).init(),
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
