//! Exponential backoff for requests that are safe to repeat.

use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use super::error::HttpError;

/// `max_retries` is the number of attempts, the first one included.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

impl RetryConfig {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    fn attempts(&self) -> usize {
        self.max_retries.max(1)
    }

    /// Pause before retry number `retry` (starting at 1): the initial delay,
    /// doubled for every further retry and capped at `max_delay_ms`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(
            self.initial_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("Exhausted all {attempts} retry attempts: {error}")]
    ExhaustedRetries { error: HttpError, attempts: usize },
    #[error("{0}")]
    NonRetriable(HttpError),
}

impl RetryError {
    pub fn into_http_error(self) -> HttpError {
        match self {
            Self::ExhaustedRetries { error, .. } | Self::NonRetriable(error) => error,
        }
    }
}

/// Server side failures and timeouts may go away on their own; a 4xx or an
/// unparseable body will not.
fn is_transient(err: &HttpError) -> bool {
    match err {
        HttpError::Http { status, .. } => *status >= 500,
        HttpError::Timeout => true,
        HttpError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        HttpError::ParseError(_) => false,
    }
}

/// Run `f` until it succeeds, fails for good, or the attempts run out.
pub async fn with_retry<F, Fut, T>(f: F, config: &RetryConfig) -> Result<T, RetryError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, HttpError>>,
{
    let attempts = config.attempts();
    let mut attempt = 1;

    loop {
        let err = match f().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempts == 1 || !is_transient(&err) {
            return Err(RetryError::NonRetriable(err));
        }
        if attempt >= attempts {
            return Err(RetryError::ExhaustedRetries {
                error: err,
                attempts,
            });
        }

        let delay = config.delay_for(attempt as u32);
        warn!(
            "Request failed (attempt {}/{}), retrying in {:?}: {}",
            attempt, attempts, delay, err
        );
        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn test_backoff_doubles_up_to_the_cap() {
        let config = RetryConfig::default();
        let delays: Vec<u64> = (1..=6)
            .map(|retry| config.delay_for(retry).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000, 8000]);
        assert_eq!(config.delay_for(200), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_attempts() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HttpError::http(503, "upstream unavailable"))
            },
            &fast(),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(RetryError::ExhaustedRetries { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_token_is_not_retried() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HttpError::http(401, "invalid JWT"))
            },
            &fast(),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::NonRetriable(_)));
        assert_eq!(err.to_string(), "HTTP 401: invalid JWT");
    }

    #[tokio::test]
    async fn test_timeout_then_success() {
        let calls = &AtomicUsize::new(0);
        let result = with_retry(
            move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(HttpError::Timeout)
                } else {
                    Ok("user")
                }
            },
            &fast(),
        )
        .await;

        assert_eq!(result.unwrap(), "user");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_attempt_config() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HttpError::Timeout)
            },
            &RetryConfig::none(),
        )
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::NonRetriable(_))));
    }
}
