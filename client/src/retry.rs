//! HTTP retry policy with exponential backoff.
//!
//! # Retry Policy
//!
//! - Max retries: 2 (3 total attempts)
//! - Initial delay: 500ms
//! - Max delay: 8 seconds
//! - Jitter: down-jitter up to 25% (multiplier in [0.75, 1.0])
//!
//! # Retryable Conditions
//!
//! - HTTP 408, 429, 5xx
//! - Connection errors
//!
//! The rulebot status contract (403 invalid key, 404 backend offline) is
//! never retried: those responses are final and classified upstream.
//! `Retry-After` / `Retry-After-Ms` headers are respected when present, and a
//! stable `Idempotency-Key` is sent across all attempts of one logical
//! request.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, header::HeaderMap};
use uuid::Uuid;

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting the initial request).
    pub max_retries: u32,
    /// Initial backoff delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum backoff delay.
    pub max_delay: Duration,
    /// Jitter factor for down-jitter (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

/// Parse `Retry-After` or `Retry-After-Ms` headers.
///
/// Returns `Some(duration)` if a valid value is found and `0 < duration < 60s`.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(val) = headers.get("retry-after-ms")
        && let Ok(s) = val.to_str()
        && let Ok(ms) = s.parse::<f64>()
    {
        let duration = Duration::from_secs_f64(ms / 1000.0);
        if duration > Duration::ZERO && duration < Duration::from_secs(60) {
            return Some(duration);
        }
    }

    if let Some(val) = headers.get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.parse::<u64>()
    {
        let duration = Duration::from_secs(secs);
        if duration > Duration::ZERO && duration < Duration::from_secs(60) {
            return Some(duration);
        }
    }

    None
}

/// Determine if a response status is worth another attempt.
#[must_use]
pub fn should_retry(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500..=599)
}

/// Calculate retry delay with exponential backoff and jitter.
///
/// - `backoff_step`: 0 before the first retry, 1 before the second, etc.
/// - Respects `Retry-After` headers if present and valid.
#[must_use]
pub fn calculate_retry_delay(
    backoff_step: u32,
    config: &RetryConfig,
    headers: Option<&HeaderMap>,
) -> Duration {
    if let Some(headers) = headers
        && let Some(delay) = parse_retry_after(headers)
    {
        return delay;
    }

    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

fn generate_idempotency_key() -> String {
    format!("rulebot-retry-{}", Uuid::new_v4())
}

/// Outcome of a retry operation.
///
/// A completed exchange carries the final response whatever its status;
/// classifying that status is the caller's job, done exactly once.
#[derive(Debug)]
pub enum RetryOutcome {
    /// The server produced a final response (success or a non-retryable
    /// status, or retries were exhausted).
    Completed(Response),
    /// Transport failure after exhausting retries.
    ConnectionError {
        attempts: u32,
        source: reqwest::Error,
    },
    /// Transport failure on the first attempt that cannot be retried.
    NonRetryable(reqwest::Error),
}

/// Send a request with automatic retries.
///
/// `build_request` is called once per attempt; every attempt carries the same
/// `Idempotency-Key` header.
pub async fn send_with_retry<F>(build_request: F, config: &RetryConfig) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let idempotency_key = generate_idempotency_key();

    if config.max_retries == 0 {
        return match attempt(&build_request, &idempotency_key).await {
            Ok(response) => RetryOutcome::Completed(response),
            Err(e) => RetryOutcome::NonRetryable(e),
        };
    }

    for retry_count in 0..config.max_retries {
        match attempt(&build_request, &idempotency_key).await {
            Ok(response) => {
                let status = response.status();
                if should_retry(status) {
                    let delay =
                        calculate_retry_delay(retry_count, config, Some(response.headers()));
                    tracing::debug!(
                        status = %status,
                        retry_count = retry_count + 1,
                        delay_ms = delay.as_millis(),
                        "Retrying request after error status"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return RetryOutcome::Completed(response);
            }
            Err(e) => {
                if is_retryable_error(&e) {
                    let delay = calculate_retry_delay(retry_count, config, None);
                    tracing::debug!(
                        error = %e,
                        retry_count = retry_count + 1,
                        delay_ms = delay.as_millis(),
                        "Retrying request after connection error"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }

                if retry_count == 0 {
                    return RetryOutcome::NonRetryable(e);
                }
                return RetryOutcome::ConnectionError {
                    attempts: retry_count + 1,
                    source: e,
                };
            }
        }
    }

    // Final attempt: whatever comes back is final.
    match attempt(&build_request, &idempotency_key).await {
        Ok(response) => RetryOutcome::Completed(response),
        Err(e) => RetryOutcome::ConnectionError {
            attempts: config.max_retries + 1,
            source: e,
        },
    }
}

async fn attempt<F>(build_request: &F, idempotency_key: &str) -> Result<Response, reqwest::Error>
where
    F: Fn() -> RequestBuilder,
{
    build_request()
        .header("Idempotency-Key", idempotency_key)
        .send()
        .await
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}

#[cfg(test)]
mod tests {
    use super::{
        RetryConfig, calculate_retry_delay, generate_idempotency_key, parse_retry_after,
        should_retry,
    };
    use reqwest::StatusCode;
    use reqwest::header::{HeaderMap, HeaderValue};
    use std::time::Duration;

    #[test]
    fn parse_retry_after_ms() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after-ms", HeaderValue::from_static("1500"));
        assert_eq!(
            parse_retry_after(&headers),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(5)));
    }

    #[test]
    fn parse_retry_after_out_of_range() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("120"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.clear();
        headers.insert("retry-after", HeaderValue::from_static("0"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn retryable_status_codes() {
        assert!(should_retry(StatusCode::REQUEST_TIMEOUT)); // 408
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS)); // 429
        assert!(should_retry(StatusCode::INTERNAL_SERVER_ERROR)); // 500
        assert!(should_retry(StatusCode::BAD_GATEWAY)); // 502
        assert!(should_retry(StatusCode::SERVICE_UNAVAILABLE)); // 503

        // The status contract is final: these classify, they never retry.
        assert!(!should_retry(StatusCode::OK)); // 200
        assert!(!should_retry(StatusCode::FORBIDDEN)); // 403
        assert!(!should_retry(StatusCode::NOT_FOUND)); // 404
        assert!(!should_retry(StatusCode::BAD_REQUEST)); // 400
    }

    #[test]
    fn retry_delay_bounds() {
        let config = RetryConfig::default();

        // First retry (backoff_step=0): base = 500ms
        // With jitter in [0.75, 1.0], delay should be in [375ms, 500ms]
        for _ in 0..100 {
            let delay = calculate_retry_delay(0, &config, None);
            assert!(delay >= Duration::from_millis(375));
            assert!(delay <= Duration::from_millis(500));
        }

        // Second retry (backoff_step=1): base = 1000ms
        for _ in 0..100 {
            let delay = calculate_retry_delay(1, &config, None);
            assert!(delay >= Duration::from_millis(750));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn retry_delay_respects_retry_after() {
        let config = RetryConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));

        let delay = calculate_retry_delay(0, &config, Some(&headers));
        assert_eq!(delay, Duration::from_secs(3));
    }

    #[test]
    fn idempotency_keys_are_unique() {
        let key1 = generate_idempotency_key();
        let key2 = generate_idempotency_key();
        assert!(key1.starts_with("rulebot-retry-"));
        assert!(key2.starts_with("rulebot-retry-"));
        assert_ne!(key1, key2);
    }
}
