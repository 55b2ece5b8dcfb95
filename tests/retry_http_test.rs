//! Retry behavior over real HTTP
//!
//! Drives the resilient transport against mockito servers returning
//! transient and permanent failures.

mod support;

use async_trait::async_trait;
use serde_json::json;
use siumai_engine::prelude::*;
use siumai_engine::transport::{HttpTransportRequest, HttpTransportResponse, ReqwestTransport};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

fn resilient(max_retries: u32) -> ResilientTransport {
    let inner = ReqwestTransport::from_config(&HttpConfig::default()).unwrap();
    ResilientTransport::new(Arc::new(inner), support::fast_retry(max_retries))
}

#[tokio::test]
async fn three_unavailable_then_ok_succeeds() {
    let mut server = support::start().await;
    let unavailable = server
        .mock("POST", "/v1/ping")
        .with_status(503)
        .with_body("busy")
        .expect(3)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/v1/ping")
        .with_status(200)
        .with_body(r#"{"ok":true}"#)
        .expect(1)
        .create_async()
        .await;

    let request = TransportRequest::post(format!("{}/v1/ping", server.url()))
        .with_body(RequestBody::json(json!({"n": 1})));
    let response = resilient(3).execute(request).await.unwrap();
    assert_eq!(response.status, 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);

    unavailable.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn four_unavailable_exhausts_retries_with_last_status() {
    let mut server = support::start().await;
    let unavailable = server
        .mock("POST", "/v1/ping")
        .with_status(503)
        .with_body(r#"{"error":{"message":"overloaded"}}"#)
        .expect(4)
        .create_async()
        .await;

    let request = TransportRequest::post(format!("{}/v1/ping", server.url()));
    let err = resilient(3).execute(request).await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert!(err.is_retryable());
    unavailable.assert_async().await;
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let mut server = support::start().await;
    let denied = server
        .mock("POST", "/v1/ping")
        .with_status(401)
        .with_body(r#"{"error":{"message":"bad key"}}"#)
        .expect(1)
        .create_async()
        .await;

    let request = TransportRequest::post(format!("{}/v1/ping", server.url()));
    let err = resilient(3).execute(request).await.unwrap_err();
    assert!(matches!(err, LlmError::AuthenticationError(_)));
    denied.assert_async().await;
}

#[tokio::test]
async fn retry_after_header_sets_the_wait() {
    let mut server = support::start().await;
    let limited = server
        .mock("POST", "/v1/ping")
        .with_status(429)
        .with_header("retry-after", "0.2")
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/v1/ping")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let started = Instant::now();
    let request = TransportRequest::post(format!("{}/v1/ping", server.url()));
    let response = resilient(1).execute(request).await.unwrap();
    assert_eq!(response.status, 200);
    // Computed backoff would be 5ms; the hint wins.
    assert!(started.elapsed() >= Duration::from_millis(180));

    limited.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn body_is_resent_on_every_attempt() {
    let mut server = support::start().await;
    let failing = server
        .mock("POST", "/v1/ping")
        .match_body(r#"{"n":1}"#)
        .with_status(502)
        .expect(2)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/v1/ping")
        .match_body(r#"{"n":1}"#)
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let request = TransportRequest::post(format!("{}/v1/ping", server.url()))
        .with_body(RequestBody::json(json!({"n": 1})));
    assert_eq!(resilient(2).execute(request).await.unwrap().status, 200);
    failing.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn client_stream_retries_before_decoding() {
    let mut server = support::start().await;
    let _unavailable = server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;
    let _ok = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(support::sse(&[
            r#"{"choices":[{"delta":{"content":"recovered"}}]}"#,
            "[DONE]",
        ]))
        .create_async()
        .await;

    let client = StreamingClient::new(support::engine(
        vec![Endpoint::new("openai", server.url(), Dialect::OpenAi)],
        2,
    ))
    .unwrap();
    let result = client
        .generate("gpt-4o", json!({"messages": []}), None)
        .await
        .unwrap();
    assert_eq!(result.text, "recovered");
}

#[tokio::test]
async fn cancelled_handle_stops_before_first_attempt() {
    let mut server = support::start().await;
    let never = server
        .mock("POST", "/v1/ping")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let cancel = CancelHandle::new();
    cancel.cancel();
    let request = TransportRequest::post(format!("{}/v1/ping", server.url()));
    let err = resilient(3)
        .execute_with_cancel(request, Some(&cancel))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    never.assert_async().await;
}

/// Counts the attempts that reach the real transport.
struct Counting {
    inner: ReqwestTransport,
    calls: AtomicU32,
}

#[async_trait]
impl HttpTransport for Counting {
    async fn send(&self, request: HttpTransportRequest) -> Result<HttpTransportResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.send(request).await
    }
}

#[tokio::test]
async fn unresolvable_host_is_attempted_once() {
    let counting = Arc::new(Counting {
        inner: ReqwestTransport::from_config(&HttpConfig::default()).unwrap(),
        calls: AtomicU32::new(0),
    });
    let transport = ResilientTransport::new(counting.clone(), support::fast_retry(3));

    let err = transport
        .execute(TransportRequest::get("http://no-such-host.invalid/v1/ping"))
        .await
        .unwrap_err();
    assert!(!err.is_retryable(), "got {err:?}");
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
}
