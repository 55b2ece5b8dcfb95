//! HTTP transport abstraction.
//!
//! [`HttpTransport`] performs exactly one HTTP exchange. It is injectable so
//! tests (and callers with their own HTTP stack) can observe the final
//! URL/headers/body and return a synthetic response without going through
//! `reqwest`. [`ResilientTransport`] layers the retry policy on top of any
//! implementation.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::error::LlmError;

pub mod request;
pub mod reqwest_transport;
pub mod resilient;
pub mod response;

pub use request::{BodyFactory, RequestBody, TransportRequest};
pub use reqwest_transport::ReqwestTransport;
pub use resilient::ResilientTransport;
pub use response::{HttpTransportRequest, HttpTransportResponse};

/// Response body as a stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// A single HTTP exchange.
///
/// Implementations must not retry; retrying is the job of [`ResilientTransport`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpTransportRequest) -> Result<HttpTransportResponse, LlmError>;
}

/// Wrap a fully buffered payload as a single-item [`ByteStream`].
pub fn byte_stream_from(body: impl Into<Bytes>) -> ByteStream {
    let body = body.into();
    Box::pin(futures::stream::once(async move { Ok(body) }))
}

/// Wrap a list of byte chunks, delivered in order, as a [`ByteStream`].
pub fn byte_stream_from_chunks<I, B>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = B>,
    B: Into<Bytes>,
{
    let items: Vec<Result<Bytes, LlmError>> = chunks.into_iter().map(|c| Ok(c.into())).collect();
    Box::pin(futures::stream::iter(items))
}
