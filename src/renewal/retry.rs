// Retry with exponential backoff for renewal steps
//
// Only errors the engine classifies as transient are retried; logical
// failures (conflicts, missing passphrases, bad input) surface immediately.

use crate::Result;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retry attempts after the initial try
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

pub async fn retry_with_backoff<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    let mut backoff = config.initial_backoff;

    loop {
        match operation().await {
            Ok(result) => {
                if retries > 0 {
                    tracing::debug!(retries, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_transient() || retries >= config.max_retries {
                    return Err(e);
                }
                retries += 1;
                tracing::warn!(
                    attempt = retries,
                    max = config.max_retries,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}
