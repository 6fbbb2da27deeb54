//! Database configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database user
    #[serde(default = "default_user")]
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Database name
    #[serde(default = "default_name")]
    pub name: String,

    /// SSL mode (disable, prefer, require)
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Maximum open connections in the pool
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: u32,

    /// Connections the pool keeps warm
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: u32,

    /// Maximum lifetime of a connection in seconds
    #[serde(default = "default_conn_max_lifetime")]
    pub conn_max_lifetime_secs: u64,

    /// Maximum idle time of a connection in seconds
    #[serde(default = "default_conn_max_idle_time")]
    pub conn_max_idle_time_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            name: default_name(),
            ssl_mode: default_ssl_mode(),
            max_open_conns: default_max_open_conns(),
            max_idle_conns: default_max_idle_conns(),
            conn_max_lifetime_secs: default_conn_max_lifetime(),
            conn_max_idle_time_secs: default_conn_max_idle_time(),
        }
    }
}

impl DatabaseConfig {
    /// Connection URL for sqlx
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.ssl_mode
        )
    }

    /// Connection URL with the password masked for logging
    pub fn url_masked(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}?sslmode={}",
            self.user, self.host, self.port, self.name, self.ssl_mode
        )
    }

    pub fn conn_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.conn_max_lifetime_secs)
    }

    pub fn conn_max_idle_time(&self) -> Duration {
        Duration::from_secs(self.conn_max_idle_time_secs)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "paygate".to_string()
}

fn default_name() -> String {
    "paygate".to_string()
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

fn default_max_open_conns() -> u32 {
    25
}

fn default_max_idle_conns() -> u32 {
    5
}

fn default_conn_max_lifetime() -> u64 {
    1800
}

fn default_conn_max_idle_time() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_url_hides_password() {
        let config = DatabaseConfig {
            password: "secret123".to_string(),
            ..Default::default()
        };
        assert!(config.url().contains("secret123"));
        assert!(!config.url_masked().contains("secret123"));
        assert!(config.url_masked().contains("***"));
    }

    #[test]
    fn url_shape() {
        let config = DatabaseConfig::default();
        assert_eq!(
            config.url(),
            "postgres://paygate:@localhost:5432/paygate?sslmode=prefer"
        );
    }
}
