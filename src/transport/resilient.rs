//! Retrying transport.
//!
//! Issues one logical request through an inner [`HttpTransport`], retrying
//! transient failures under a [`RetryPolicy`]. Retryable outcomes are status
//! 429/500/502/503/504 and transport timeouts or transient connection errors.
//! Caller cancellation is observed both in flight and while waiting out a delay.

use bytes::Bytes;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::{HttpTransport, HttpTransportRequest, HttpTransportResponse, RequestBody, TransportRequest};
use crate::error::LlmError;
use crate::retry::{RetryDecision, RetryPolicy, RetryState, parse_retry_after};
use crate::retry_api::classify_http_error;
use crate::utils::cancel::{CancelHandle, run_cancellable};

#[derive(Clone)]
pub struct ResilientTransport {
    inner: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for ResilientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientTransport")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ResilientTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &Arc<dyn HttpTransport> {
        &self.inner
    }

    /// Execute without a cancellation handle.
    pub async fn execute(&self, request: TransportRequest) -> Result<HttpTransportResponse, LlmError> {
        self.execute_with_cancel(request, None).await
    }

    /// Execute, retrying transient failures.
    ///
    /// Returns the first 2xx response, the first non-retryable error, the
    /// caller's cancellation error, or the last failure once attempts run out.
    pub async fn execute_with_cancel(
        &self,
        request: TransportRequest,
        cancel: Option<&CancelHandle>,
    ) -> Result<HttpTransportResponse, LlmError> {
        let span = tracing::info_span!(
            "transport.execute",
            request_id = %Uuid::new_v4(),
            provider = %request.provider,
            method = %request.method,
            url = %request.url,
        );
        self.run(request, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request: TransportRequest,
        cancel: Option<&CancelHandle>,
    ) -> Result<HttpTransportResponse, LlmError> {
        let TransportRequest {
            method,
            url,
            headers,
            mut body,
            provider,
        } = request;
        let mut state = RetryState::new(self.policy.clone());

        while let Some(attempt) = state.begin_attempt() {
            if let Some(handle) = cancel
                && handle.is_cancelled()
            {
                state.cancel(handle.error());
                break;
            }

            let payload = match body_for_attempt(&mut body, &mut state, cancel).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "request body unavailable");
                    return Err(e);
                }
            };

            tracing::trace!(attempt, "sending request");
            let sent = run_cancellable(
                cancel,
                self.inner.send(HttpTransportRequest {
                    method: method.clone(),
                    url: url.clone(),
                    headers: headers.clone(),
                    body: payload,
                    attempt,
                }),
            )
            .await;

            let (error, hint) = match sent {
                Ok(response) if response.is_success() => {
                    tracing::debug!(attempt, status = response.status, "request succeeded");
                    state.succeed();
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status;
                    let response_headers = response.headers.clone();
                    let hint = parse_retry_after(&response_headers);
                    match run_cancellable(cancel, response.text()).await {
                        Ok(text) => (
                            classify_http_error(&provider, status, &text, &response_headers, None),
                            hint,
                        ),
                        Err(e) if e.is_cancelled() => (e, None),
                        Err(_) => (
                            classify_http_error(&provider, status, "", &response_headers, None),
                            hint,
                        ),
                    }
                }
                Err(e) => (e, None),
            };

            match state.fail(error, hint) {
                RetryDecision::GiveUp => break,
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        server_hint = hint.is_some(),
                        error = ?state.last_error(),
                        "request failed, retrying"
                    );
                    let wait = async {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    };
                    if let Err(cancelled) = run_cancellable(cancel, wait).await {
                        tracing::debug!(attempt, "retry wait cancelled");
                        state.cancel(cancelled);
                        break;
                    }
                }
            }
        }

        tracing::debug!(
            attempts = state.attempts(),
            phase = ?state.phase(),
            total_delay_ms = state.total_delay().as_millis() as u64,
            "request gave up"
        );
        Err(state.into_error())
    }
}

/// Bytes to send on this attempt. One-shot streams are drained once and the
/// buffer is replayed on later attempts.
async fn body_for_attempt(
    body: &mut RequestBody,
    state: &mut RetryState,
    cancel: Option<&CancelHandle>,
) -> Result<Bytes, LlmError> {
    if let Some(buffered) = state.buffered_body() {
        return Ok(buffered.clone());
    }
    match body {
        RequestBody::Empty => Ok(Bytes::new()),
        RequestBody::Bytes(bytes) => Ok(bytes.clone()),
        RequestBody::Factory(factory) => factory(),
        RequestBody::Stream(_) => {
            let RequestBody::Stream(stream) = std::mem::take(body) else {
                return Err(LlmError::InternalError("request body changed shape".into()));
            };
            let buffered = run_cancellable(cancel, RequestBody::buffer_stream(stream)).await?;
            state.set_buffered_body(buffered.clone());
            Ok(buffered)
        }
    }
}
