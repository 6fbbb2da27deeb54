//! Server configuration
//!
//! Layered the usual way: built-in defaults, then an optional config
//! file, then `PAYGATE__`-prefixed environment variables, then CLI
//! flags applied by `main`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use paygate_bank::{BankClientConfig, RetryPolicy};
use paygate_db::DatabaseConfig;
use paygate_workers::WorkerConfig;

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub bank_client: BankClientConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub logger: LoggerConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds allowed for reading a request
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Seconds allowed for writing a response
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Seconds an idle keep-alive connection is retained
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Deadline a request task gets before it is abandoned
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs + self.write_timeout_secs)
    }
}

/// Logger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_read_timeout() -> u64 {
    15
}

fn default_write_timeout() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl AppConfig {
    /// Load configuration from defaults, an optional file, and the
    /// environment (`PAYGATE__SECTION__KEY`).
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("PAYGATE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_any_source() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logger.level, "info");
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn request_deadline_covers_read_and_write() {
        let settings = ServerSettings::default();
        assert_eq!(settings.request_deadline(), Duration::from_secs(30));
    }
}
