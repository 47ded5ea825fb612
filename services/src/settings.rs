use util::config;

use crate::retry::RetryPolicy;

/// Tunables shared by the services, snapshotted from [`util::config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Retry policy for idempotent reads that hit a transient connection error.
    pub read_retry: RetryPolicy,
    /// Attempts for a reconciliation that lost a write race.
    pub write_retry_attempts: u32,
    /// Page size used when a history query does not name one.
    pub history_limit: u64,
}

impl ServiceSettings {
    pub fn from_config() -> Self {
        Self {
            read_retry: RetryPolicy {
                max_attempts: config::read_retry_attempts(),
                ..RetryPolicy::default()
            },
            write_retry_attempts: config::write_retry_attempts(),
            history_limit: config::history_limit(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            read_retry: RetryPolicy::default(),
            write_retry_attempts: 3,
            history_limit: 10,
        }
    }
}
