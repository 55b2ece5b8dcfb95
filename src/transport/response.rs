//! Transport-level request/response data for a single attempt.

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::fmt;

use super::ByteStream;
use crate::error::LlmError;

/// What an [`HttpTransport`](super::HttpTransport) sends on one attempt.
#[derive(Debug, Clone)]
pub struct HttpTransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Zero-based attempt index within the logical request.
    pub attempt: u32,
}

/// Transport-level response data. The body is streamed.
pub struct HttpTransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl HttpTransportResponse {
    pub fn new(status: u16, headers: HeaderMap, body: ByteStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_byte_stream(self) -> ByteStream {
        self.body
    }

    /// Read the whole body.
    pub async fn bytes(mut self) -> Result<Bytes, LlmError> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }

    /// Read the whole body as (lossy) UTF-8.
    pub async fn text(self) -> Result<String, LlmError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> Result<T, LlmError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| LlmError::ParseError(format!("Invalid JSON response body: {e}")))
    }
}

impl fmt::Debug for HttpTransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
