//! Logical request handed to the resilient transport.

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::sync::Arc;

use super::ByteStream;
use crate::error::LlmError;

/// Produces a fresh body for every attempt.
pub type BodyFactory = Arc<dyn Fn() -> Result<Bytes, LlmError> + Send + Sync>;

/// Request body. Every variant is re-issued unchanged on each attempt.
#[derive(Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Already-buffered bytes; cloned per attempt.
    Bytes(Bytes),
    /// Invoked once per attempt.
    Factory(BodyFactory),
    /// One-shot stream. Buffered on the first attempt and replayed afterwards.
    Stream(ByteStream),
}

impl RequestBody {
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn() -> Result<Bytes, LlmError> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(f))
    }

    /// Serialize `value` to JSON on every attempt.
    pub fn json<T>(value: T) -> Self
    where
        T: serde::Serialize + Send + Sync + 'static,
    {
        Self::factory(move || Ok(Bytes::from(serde_json::to_vec(&value)?)))
    }

    /// Drain a one-shot stream into memory.
    pub(crate) async fn buffer_stream(mut stream: ByteStream) -> Result<Bytes, LlmError> {
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }
}

impl From<Bytes> for RequestBody {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// One logical HTTP request, possibly issued several times.
#[derive(Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Label used when classifying errors and in log fields.
    pub provider: String,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            provider: "http".to_string(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Add a header. Invalid names or values are rejected up front.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, LlmError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LlmError::InvalidInput(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| LlmError::InvalidInput(format!("invalid header value for {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }
}
