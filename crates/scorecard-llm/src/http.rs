//! Status and error mapping shared by the HTTP backends.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use scorecard_core::EvalError;
use tracing::debug;

pub(crate) fn client() -> Result<Client, EvalError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| EvalError::Transport(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn map_reqwest(e: reqwest::Error, timeout: Duration) -> EvalError {
    if e.is_timeout() {
        EvalError::Timeout(timeout)
    } else {
        EvalError::Transport(e.to_string())
    }
}

/// Runs `fut` under the configured deadline.
pub(crate) async fn with_deadline<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, EvalError>>,
) -> Result<T, EvalError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| EvalError::Timeout(timeout))?
}

/// Passes successful responses through; maps 429 to `RateLimited` and
/// everything else to `Transport`.
pub(crate) async fn check_status(response: Response, provider: &str) -> Result<Response, EvalError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = format!("{} API error {}: {}", provider, status, body);

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(EvalError::RateLimited { retry_after, message }),
        _ => Err(EvalError::Transport(message)),
    }
}

/// Delay-seconds form only. HTTP-date values fall back to the retry policy's backoff.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?;
    let parsed = value.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok());
    if parsed.is_none() {
        debug!("Ignoring non-numeric Retry-After {:?}; using exponential backoff", value);
    }
    parsed.map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 12 "));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_retry_after_http_date_falls_back_to_backoff() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("-3"));
        assert_eq!(retry_after(&headers), None);
    }

    #[tokio::test]
    async fn test_deadline_maps_to_timeout() {
        let limit = Duration::from_millis(10);
        let result: Result<(), EvalError> = with_deadline(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(EvalError::Timeout(d)) if d == limit));
    }
}
