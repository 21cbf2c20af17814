//! Retry with exponential backoff for transient cache failures

use entcache_core::{CacheError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Which errors should trigger a retry
#[derive(Clone)]
pub enum RetryOn {
    /// Only errors classified as transient
    Transient,
    /// Custom retry predicate
    Custom(Arc<dyn Fn(&CacheError) -> bool + Send + Sync>),
}

impl std::fmt::Debug for RetryOn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryOn::Transient => write!(f, "RetryOn::Transient"),
            RetryOn::Custom(_) => write!(f, "RetryOn::Custom(<predicate>)"),
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: usize,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Jitter factor for randomization (0.0 to 1.0)
    pub jitter_factor: f64,
    pub retry_on: RetryOn,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            jitter_factor: 0.1,
            retry_on: RetryOn::Transient,
        }
    }
}

impl RetryConfig {
    /// A config that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Check if an error should be retried
    pub fn should_retry(&self, error: &CacheError) -> bool {
        match &self.retry_on {
            RetryOn::Transient => error.is_transient(),
            RetryOn::Custom(predicate) => predicate(error),
        }
    }

    /// Calculate delay for a given attempt with exponential backoff and jitter
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16) as u32);
        let capped_delay = self.base_delay.saturating_mul(factor).min(self.max_delay);

        if self.jitter_factor > 0.0 {
            let jitter_range = capped_delay.as_millis() as f64 * self.jitter_factor;
            let normalized = (fastrand::f64() - 0.5) * 2.0;
            let final_millis = (capped_delay.as_millis() as f64 + normalized * jitter_range).max(0.0);
            Duration::from_millis(final_millis as u64)
        } else {
            capped_delay
        }
    }
}

/// Execute an operation with retry logic
pub async fn retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "operation succeeded after retries");
                }
                return Ok(result);
            }
            Err(error) if attempt < config.max_retries && config.should_retry(&error) => {
                let delay = config.calculate_delay(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = config.max_retries + 1,
                    ?delay,
                    %error,
                    "operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
