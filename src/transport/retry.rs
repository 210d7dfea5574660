//! Backoff policy for transient backend failures.
//!
//! Classification and backoff come from `reqwest-retry`: connection errors,
//! timeouts and 408/429/5xx responses are transient, everything else is
//! returned to the caller as-is. Requests are rebuilt by the caller on every
//! attempt because each one carries its own signature and date.

use std::future::Future;
use std::time::{Duration, SystemTime};

use reqwest::Response;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryPolicy as _;
use reqwest_retry::{DefaultRetryableStrategy, RetryDecision, Retryable, RetryableStrategy};

/// Retry configuration for a single backend request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `None` retries until the caller's
    /// deadline drops the future.
    pub max_retries: Option<u32>,
    /// Lower bound on the delay between attempts.
    pub min_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::default().with_max_retries(Some(0))
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .retry_bounds(self.min_delay, self.max_delay)
            .build_with_max_retries(self.max_retries.unwrap_or(u32::MAX))
    }

    /// Run `create_request` until it yields a non-transient result or the
    /// retry budget is spent.
    ///
    /// A response with an error status is still `Ok`; only the strategy
    /// decides whether it is worth another attempt.
    pub async fn send<F, Fut>(&self, what: &str, create_request: F) -> Result<Response, reqwest_middleware::Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Response, reqwest_middleware::Error>>,
    {
        let backoff = self.backoff();
        let strategy = DefaultRetryableStrategy;
        let start_time = SystemTime::now();
        let mut attempt: u32 = 0;

        loop {
            let result = create_request().await;
            let Some(Retryable::Transient) = strategy.handle(&result) else {
                return result;
            };
            match backoff.should_retry(start_time, attempt) {
                RetryDecision::Retry { execute_after } => {
                    let wait = execute_after.duration_since(SystemTime::now()).unwrap_or_default();
                    attempt += 1;
                    match &result {
                        Ok(response) => {
                            tracing::warn!(%what, attempt, status = response.status().as_u16(), ?wait, "Transient backend status, retrying")
                        }
                        Err(err) => tracing::warn!(%what, attempt, error = %err, ?wait, "Transient backend failure, retrying"),
                    }
                    tokio::time::sleep(wait).await;
                }
                RetryDecision::DoNotRetry => return result,
            }
        }
    }
}
