//! Retry with classified backoff for resilient source calls.
//!
//! Errors are classified into an [`ErrorKind`], which determines whether a
//! retry happens at all and the backoff curve (shape, base delay, and cap)
//! used between attempts. A breaker that is open rejects the task outright
//! with `CIRCUIT_OPEN` before the adapter is ever invoked; it is not a
//! retryable attempt against the source.

use std::time::Duration;
use tokio::time::sleep;

use crate::sources::SourceError;

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_total_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(300),
        }
    }
}

/// Classification of a [`SourceError`] for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Server told us to back off, optionally with a known retry-after.
    RateLimit,
    /// Connection-level failure; retry with exponential backoff.
    Network,
    /// Non-2xx API response not otherwise classified; retry with linear backoff.
    Api,
    /// Response body could not be parsed; not retried, the server won't change its mind.
    Parse,
    /// Caller-supplied request was malformed; not retried.
    Validation,
    /// Anything else considered non-recoverable.
    Permanent,
    /// Rejected by an open circuit breaker without reaching the adapter.
    CircuitOpen,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorKind::Parse | ErrorKind::Validation | ErrorKind::Permanent | ErrorKind::CircuitOpen
        )
    }

    /// Rate-limit and API errors back off multiplicatively; network errors
    /// back off linearly (attempt * base).
    fn uses_exponential_backoff(self) -> bool {
        matches!(self, ErrorKind::RateLimit | ErrorKind::Api)
    }

    /// (base delay, cap) for this kind's backoff curve.
    fn backoff_bounds(self) -> (Duration, Duration) {
        match self {
            ErrorKind::RateLimit => (Duration::from_secs(2), Duration::from_secs(60)),
            ErrorKind::Network => (Duration::from_secs(1), Duration::from_secs(30)),
            ErrorKind::Api => (Duration::from_secs(4), Duration::from_secs(120)),
            ErrorKind::Parse | ErrorKind::Validation | ErrorKind::Permanent | ErrorKind::CircuitOpen => {
                (Duration::from_secs(0), Duration::from_secs(0))
            }
        }
    }
}

/// Classify a [`SourceError`] into an [`ErrorKind`].
pub fn classify_error(err: &SourceError) -> ErrorKind {
    match err {
        SourceError::RateLimit | SourceError::RateLimitAfter(_) => ErrorKind::RateLimit,
        SourceError::Network(_) | SourceError::Io(_) => ErrorKind::Network,
        SourceError::Parse(_) => ErrorKind::Parse,
        SourceError::InvalidRequest(_) => ErrorKind::Validation,
        SourceError::NotFound(_) | SourceError::NotImplemented => ErrorKind::Permanent,
        SourceError::CircuitOpen => ErrorKind::CircuitOpen,
        SourceError::Api(_) | SourceError::Other(_) => ErrorKind::Api,
    }
}

fn retry_after(err: &SourceError) -> Option<Duration> {
    match err {
        SourceError::RateLimitAfter(secs) => Some(Duration::from_secs(*secs)),
        _ => None,
    }
}

/// Apply +/-25% jitter to a delay so that concurrent workers retrying the
/// same source don't synchronize on the same wall-clock instant.
fn jittered(delay: Duration) -> Duration {
    let factor = 0.75 + rand::random::<f64>() * 0.5; // [0.75, 1.25)
    Duration::from_secs_f64((delay.as_secs_f64() * factor).max(0.0))
}

fn backoff_for_attempt(config: RetryConfig, kind: ErrorKind, attempt: u32) -> Duration {
    let (base_delay, cap) = kind.backoff_bounds();
    let base = if kind.uses_exponential_backoff() {
        let exp = base_delay.as_secs_f64() * config.backoff_multiplier.powf((attempt - 1) as f64);
        Duration::from_secs_f64(exp.min(cap.as_secs_f64()))
    } else {
        let linear = base_delay.as_secs_f64() * attempt as f64;
        Duration::from_secs_f64(linear.min(cap.as_secs_f64()))
    };
    jittered(base)
}

/// Result of a retry operation.
pub enum RetryResult<T> {
    Success(T),
    TransientFailure(SourceError, ErrorKind, u32),
    PermanentFailure(SourceError),
}

/// Check a circuit breaker before an attempt. An open breaker fails the
/// attempt immediately with `CircuitOpen` rather than waiting it out; the
/// caller never reaches the adapter.
pub fn wait_for_circuit(breaker: &super::CircuitBreaker) -> Result<(), SourceError> {
    if breaker.can_request() {
        Ok(())
    } else {
        Err(SourceError::CircuitOpen)
    }
}

/// Execute an async operation with classified retry logic. If `breaker` is
/// given, a `CIRCUIT_OPEN` rejection is waited out before each attempt and
/// does not itself consume an attempt.
pub async fn with_retry<T, F, Fut>(
    config: RetryConfig,
    breaker: Option<&super::CircuitBreaker>,
    mut operation: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    match with_retry_detailed(config, breaker, &mut operation).await {
        RetryResult::Success(v) => Ok(v),
        RetryResult::TransientFailure(e, _, _) => Err(e),
        RetryResult::PermanentFailure(e) => Err(e),
    }
}

/// Execute an async operation with classified retry logic, returning the
/// detailed [`RetryResult`].
pub async fn with_retry_detailed<T, F, Fut>(
    config: RetryConfig,
    breaker: Option<&super::CircuitBreaker>,
    operation: &mut F,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SourceError>>,
{
    let mut attempts = 0u32;
    let mut total_elapsed = Duration::ZERO;
    let deadline_start = tokio::time::Instant::now();

    loop {
        if let Some(breaker) = breaker {
            if let Err(err) = wait_for_circuit(breaker) {
                return RetryResult::PermanentFailure(err);
            }
        }

        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::info!(attempts, "operation succeeded after transient failures");
                }
                return RetryResult::Success(result);
            }
            Err(error) => {
                let kind = classify_error(&error);
                if !kind.is_retryable() {
                    return RetryResult::PermanentFailure(error);
                }

                let delay = retry_after(&error).unwrap_or_else(|| backoff_for_attempt(config, kind, attempts));
                total_elapsed += delay;

                if attempts >= config.max_attempts
                    || total_elapsed >= config.max_total_time
                    || deadline_start.elapsed() >= config.max_total_time
                {
                    tracing::warn!(attempts, ?kind, "operation failed after exhausting retries");
                    return RetryResult::TransientFailure(error, kind, attempts);
                }

                tracing::debug!(attempts, ?kind, ?delay, "retrying after transient error");
                sleep(delay).await;
            }
        }
    }
}

/// Default retry configuration for external source APIs.
pub fn api_retry_config() -> RetryConfig {
    RetryConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[tokio::test]
    async fn test_retry_success_first_try() {
        let config = RetryConfig::default();
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(config, None, move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Ok("success")
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let config = RetryConfig {
            max_attempts: 4,
            max_total_time: Duration::from_secs(60),
            ..RetryConfig::default()
        };
        let call_count = Rc::new(RefCell::new(0));

        let result = {
            let call_count = call_count.clone();
            with_retry(config, None, move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    let count = *call_count.borrow();
                    if count < 3 {
                        Err(SourceError::Network("temporary error".to_string()))
                    } else {
                        Ok("success")
                    }
                }
            })
        }
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(*call_count.borrow(), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_parse_errors() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(5),
        };
        let call_count = Rc::new(RefCell::new(0));

        let result: Result<&str, SourceError> = {
            let call_count = call_count.clone();
            with_retry(config, None, move || {
                let call_count = call_count.clone();
                async move {
                    *call_count.borrow_mut() += 1;
                    Err(SourceError::Parse("invalid json".to_string()))
                }
            })
        }
        .await;

        assert!(result.is_err());
        assert_eq!(*call_count.borrow(), 1);
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(classify_error(&SourceError::RateLimit), ErrorKind::RateLimit);
        assert_eq!(classify_error(&SourceError::Network("x".into())), ErrorKind::Network);
        assert_eq!(classify_error(&SourceError::Parse("x".into())), ErrorKind::Parse);
        assert_eq!(classify_error(&SourceError::InvalidRequest("x".into())), ErrorKind::Validation);
        assert_eq!(classify_error(&SourceError::NotFound("x".into())), ErrorKind::Permanent);
        assert_eq!(classify_error(&SourceError::Api("x".into())), ErrorKind::Api);
    }

    #[test]
    fn test_error_kind_retryable() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::Api.is_retryable());
        assert!(!ErrorKind::Parse.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Permanent.is_retryable());
    }

    #[test]
    fn test_backoff_bounds_are_per_kind() {
        let config = RetryConfig::default();
        let rate_limit_delay = backoff_for_attempt(config, ErrorKind::RateLimit, 1);
        let network_delay = backoff_for_attempt(config, ErrorKind::Network, 1);
        let api_delay = backoff_for_attempt(config, ErrorKind::Api, 1);

        // first-attempt delays should roughly match each kind's base
        // (2s, 1s, 4s respectively) within jitter bounds.
        assert!(rate_limit_delay >= Duration::from_millis(1500) && rate_limit_delay <= Duration::from_millis(2500));
        assert!(network_delay >= Duration::from_millis(750) && network_delay <= Duration::from_millis(1250));
        assert!(api_delay >= Duration::from_millis(3000) && api_delay <= Duration::from_millis(5000));
    }

    #[test]
    fn test_backoff_respects_per_kind_cap() {
        let config = RetryConfig::default();
        let delay = backoff_for_attempt(config, ErrorKind::RateLimit, 20);
        assert!(delay <= Duration::from_secs(75)); // 60s cap + max jitter
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let base = Duration::from_secs(10);
        for _ in 0..50 {
            let jittered = jittered(base);
            assert!(jittered >= Duration::from_secs_f64(7.5));
            assert!(jittered < Duration::from_secs_f64(12.5));
        }
    }
}
