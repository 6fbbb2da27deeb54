//! Paygate Background Workers
//!
//! Two cooperative loops keep the payment table converging on terminal
//! states:
//!
//! - [`RetryWorker`] re-drives payments parked in retryable `*_FAILED`
//!   states and reconciles rows stranded mid-flight by a crash
//! - [`ExpirationWorker`] voids authorizations whose hold has lapsed
//!
//! Both loops tick on an interval, exit promptly on the shared shutdown
//! channel, and rely on skip-locked batch selection plus per-payment
//! row locks so multiple gateway instances can run them concurrently.

pub mod expiration;
pub mod retry;

pub use expiration::ExpirationWorker;
pub use retry::RetryWorker;

use serde::{Deserialize, Serialize};

/// Worker loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between scan cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Maximum payments processed per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Age before an in-flight payment is considered stranded;
    /// unset means twice the bank call timeout, floored at 30s
    #[serde(default)]
    pub grace_window_secs: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            batch_size: default_batch_size(),
            grace_window_secs: None,
        }
    }
}

impl WorkerConfig {
    /// Effective grace window given the bank's per-call timeout
    pub fn grace_window(&self, bank_request_timeout_secs: u64) -> u64 {
        self.grace_window_secs
            .unwrap_or_else(|| (2 * bank_request_timeout_secs).max(30))
    }
}

fn default_interval() -> u64 {
    30
}

fn default_batch_size() -> i64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = WorkerConfig::default();
        assert_eq!(config.interval_secs, 30);
        assert_eq!(config.batch_size, 50);
    }

    #[test]
    fn grace_window_defaults_to_twice_bank_timeout() {
        let config = WorkerConfig::default();
        assert_eq!(config.grace_window(30), 60);
        assert_eq!(config.grace_window(5), 30);
        let pinned = WorkerConfig {
            grace_window_secs: Some(120),
            ..Default::default()
        };
        assert_eq!(pinned.grace_window(30), 120);
    }
}
