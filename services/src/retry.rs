use std::future::Future;
use std::time::Duration;

use db::repositories::StoreError;
use tracing::warn;

/// How often an idempotent read is attempted, and how long to wait between
/// attempts (`base_backoff_ms * attempt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 50,
        }
    }
}

/// Runs an idempotent read under `policy`, retrying only transient connection
/// failures. A policy with zero attempts still runs the read once.
pub async fn with_read_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                warn!(attempt, max_attempts = policy.max_attempts, error = %err, "read failed, retrying");
                tokio::time::sleep(Duration::from_millis(
                    policy.base_backoff_ms.saturating_mul(u64::from(attempt)),
                ))
                .await;
            }
            Err(err) => return Err(err),
        }
    }
}
