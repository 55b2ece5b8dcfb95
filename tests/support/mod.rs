//! Shared helpers for HTTP-level tests.

#![allow(dead_code)]

use mockito::{Server, ServerGuard};
use siumai_engine::prelude::*;
use std::time::Duration;

/// Start an async mockito Server
pub async fn start() -> ServerGuard {
    Server::new_async().await
}

/// Fast, deterministic retries for tests.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new()
        .with_max_retries(max_retries)
        .with_initial_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(500))
        .with_jitter(false)
}

/// Engine config with the given endpoints and fast retries.
pub fn engine(endpoints: Vec<Endpoint>, max_retries: u32) -> EngineConfig {
    let mut config = EngineConfig::new().with_retry(fast_retry(max_retries));
    config.endpoints = endpoints;
    config
}

/// Join SSE `data:` payloads into one response body.
pub fn sse(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|p| format!("data: {p}\n\n"))
        .collect()
}
