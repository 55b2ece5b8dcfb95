//! Public Retry API Facade
//!
//! - `classify_http_error` turns a non-2xx response into a typed [`LlmError`]
//! - `retry_with` drives any fallible async operation through a [`RetryPolicy`]
//!
//! Example
//! ```rust,no_run
//! use siumai_engine::retry_api::retry_with;
//! use siumai_engine::retry::RetryPolicy;
//!
//! # async fn do_work() -> Result<String, siumai_engine::LlmError> { Ok("ok".into()) }
//! # async fn example() -> Result<(), siumai_engine::LlmError> {
//! let policy = RetryPolicy::new().with_max_retries(5);
//! let result = retry_with(&policy, None, || do_work()).await?;
//! # Ok(())
//! # }
//! ```

use reqwest::header::HeaderMap;
use std::future::Future;

use crate::error::LlmError;
use crate::retry::{RetryDecision, RetryPolicy, RetryState};
use crate::utils::cancel::{CancelHandle, run_cancellable};

/// Retry `operation` under `policy`, honoring cancellation between attempts.
///
/// Exhaustion returns the last error the operation produced.
pub async fn retry_with<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: Option<&CancelHandle>,
    mut operation: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut state = RetryState::new(policy.clone());
    while let Some(attempt) = state.begin_attempt() {
        if let Some(handle) = cancel
            && handle.is_cancelled()
        {
            state.cancel(handle.error());
            break;
        }
        match run_cancellable(cancel, operation()).await {
            Ok(value) => {
                state.succeed();
                return Ok(value);
            }
            Err(error) => match state.fail(error, None) {
                RetryDecision::GiveUp => break,
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = ?state.last_error(),
                        "operation failed, retrying"
                    );
                    let wait = async {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    };
                    if let Err(cancelled) = run_cancellable(cancel, wait).await {
                        state.cancel(cancelled);
                        break;
                    }
                }
            },
        }
    }
    Err(state.into_error())
}

/// Classify a non-2xx HTTP response into an [`LlmError`].
///
/// 429 and 5xx map to retryable variants; everything else is terminal.
pub fn classify_http_error(
    provider_id: &str,
    status: u16,
    body_text: &str,
    headers: &HeaderMap,
    fallback_message: Option<&str>,
) -> LlmError {
    let lower = body_text.to_lowercase();

    fn header_val(headers: &HeaderMap, name: &str) -> Option<String> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }
    let id_keys = [
        "x-request-id",
        "request-id",
        "x-openai-request-id",
        "x-trace-id",
        "x-goog-request-id",
    ];
    let request_ids: Vec<String> = id_keys
        .iter()
        .filter_map(|k| header_val(headers, k).map(|v| format!("{k}={v}")))
        .collect();
    let ids_suffix = if request_ids.is_empty() {
        String::new()
    } else {
        format!(" ids=[{}]", request_ids.join(","))
    };
    let body_sample = body_text.chars().take(200).collect::<String>();

    match status {
        429 => {
            let retry_after = header_val(headers, "retry-after").unwrap_or_default();
            return LlmError::RateLimitError(format!(
                "provider={provider_id} http=429 retry_after={retry_after}{ids_suffix} body_sample={body_sample}"
            ));
        }
        401 => {
            return LlmError::AuthenticationError(format!(
                "provider={provider_id} unauthorized{ids_suffix} body_sample={body_sample}"
            ));
        }
        404 => {
            return LlmError::NotFound(format!(
                "provider={provider_id} http=404{ids_suffix} body_sample={body_sample}"
            ));
        }
        413 | 415 => {
            return LlmError::InvalidInput(format!(
                "provider={provider_id} http={status}{ids_suffix} body_sample={body_sample}"
            ));
        }
        400 | 403 if lower.contains("quota") => {
            return LlmError::QuotaExceededError(format!("provider={provider_id} quota exceeded"));
        }
        403 => {
            return LlmError::AuthenticationError(format!(
                "provider={provider_id} forbidden{ids_suffix} body_sample={body_sample}"
            ));
        }
        400 => {
            return LlmError::InvalidInput(format!(
                "provider={provider_id} bad request{ids_suffix} body_sample={body_sample}"
            ));
        }
        _ => {}
    }

    let message = match fallback_message {
        Some(fallback) => fallback.to_string(),
        None if body_text.trim().is_empty() => {
            if (500..=599).contains(&status) {
                "server error".to_string()
            } else {
                "api error".to_string()
            }
        }
        None => body_sample.clone(),
    };
    let details = match serde_json::from_str::<serde_json::Value>(body_text) {
        Ok(json) => serde_json::json!({
            "status": status,
            "provider": provider_id,
            "response": json,
            "request_ids": request_ids,
        }),
        Err(_) => serde_json::json!({
            "status": status,
            "provider": provider_id,
            "raw": body_text,
            "request_ids": request_ids,
        }),
    };
    LlmError::api_error_with_details(status, message, details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(max_retries)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
            .with_jitter(false)
    }

    #[tokio::test]
    async fn test_retry_success_on_second_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with(&quick_policy(3), None, || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count == 0 {
                    Err(LlmError::api_error(500, "Server error"))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), LlmError> = retry_with(&quick_policy(1), None, || {
            let counter = counter_clone.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::api_error(502, format!("attempt {n}")))
            }
        })
        .await;

        match result {
            Err(LlmError::ApiError { code, message, .. }) => {
                assert_eq!(code, 502);
                assert_eq!(message, "attempt 1");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_wait_stops_retrying() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let cancel = CancelHandle::new();
        let trigger = cancel.clone();
        let policy = RetryPolicy::new()
            .with_max_retries(5)
            .with_initial_delay(Duration::from_secs(10))
            .with_jitter(false);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result: Result<(), LlmError> = retry_with(&policy, Some(&cancel), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(LlmError::api_error(503, "unavailable"))
            }
        })
        .await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(LlmError::Cancelled(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn classify_maps_common_statuses() {
        let headers = HeaderMap::new();
        assert!(matches!(
            classify_http_error("openai", 401, "", &headers, None),
            LlmError::AuthenticationError(_)
        ));
        assert!(matches!(
            classify_http_error("openai", 404, "", &headers, None),
            LlmError::NotFound(_)
        ));
        assert!(matches!(
            classify_http_error("openai", 400, "{\"error\":\"bad\"}", &headers, None),
            LlmError::InvalidInput(_)
        ));
        assert!(matches!(
            classify_http_error("openai", 403, "monthly quota reached", &headers, None),
            LlmError::QuotaExceededError(_)
        ));
        let err = classify_http_error("openai", 503, "", &headers, None);
        assert_eq!(err.status_code(), Some(503));
        assert!(err.is_retryable());
    }

    #[test]
    fn rate_limit_carries_retry_after_and_request_ids() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        headers.insert("x-request-id", HeaderValue::from_static("req_123"));
        match classify_http_error("anthropic", 429, "slow down", &headers, None) {
            LlmError::RateLimitError(msg) => {
                assert!(msg.contains("retry_after=3"));
                assert!(msg.contains("x-request-id=req_123"));
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn classify_http_error_uses_fallback_message_for_non_json_body() {
        let headers = HeaderMap::new();
        let err = classify_http_error(
            "openai",
            502,
            "<html>bad gateway</html>",
            &headers,
            Some("Bad Gateway"),
        );
        match err {
            LlmError::ApiError {
                code,
                message,
                details,
            } => {
                assert_eq!(code, 502);
                assert_eq!(message, "Bad Gateway");
                assert_eq!(
                    details.and_then(|d| d["raw"].as_str().map(str::to_string)),
                    Some("<html>bad gateway</html>".to_string())
                );
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }
}
