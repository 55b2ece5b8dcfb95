//! Streaming Client
//!
//! Wires the pieces together for one request: the [`Router`] picks the
//! endpoint, the endpoint's dialect shapes the URL and body, the
//! [`ResilientTransport`] sends it, and the response is handed to an
//! [`EventStreamDecoder`] (and optionally a collector).
//!
//! ```rust,ignore
//! use siumai_engine::prelude::*;
//!
//! let config = EngineConfig::new().with_endpoint(
//!     Endpoint::new("openai", "https://api.openai.com/v1", Dialect::OpenAi)
//!         .with_header("authorization", format!("Bearer {key}")),
//! );
//! let client = StreamingClient::new(config)?;
//! let request = ChatRequest::new("gpt-4o-mini").message(ChatMessage::user("Hi"));
//! let result = client.generate("gpt-4o-mini", &request, None).await?;
//! println!("{}", result.text);
//! ```

use bytes::Bytes;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::LlmError;
use crate::routing::{Endpoint, Router};
use crate::streaming::{
    ChunkStream, CollectorConfig, DecoderOptions, EventStreamDecoder, FinalResult, Framing,
    StreamCallbacks, StreamCollector,
};
use crate::transport::{
    HttpTransport, ReqwestTransport, RequestBody, ResilientTransport, TransportRequest,
};
use crate::types::{Chunk, ChatRequest, HttpConfig};
use crate::utils::cancel::{CancelHandle, run_cancellable};

/// Routes, sends and decodes model requests.
pub struct StreamingClient {
    transport: ResilientTransport,
    router: Router,
    http: HttpConfig,
    reasoning: bool,
    collector: CollectorConfig,
}

impl std::fmt::Debug for StreamingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingClient")
            .field("router", &self.router)
            .field("retry", self.transport.policy())
            .field("reasoning", &self.reasoning)
            .finish()
    }
}

impl StreamingClient {
    /// Build a client over a `reqwest` transport.
    pub fn new(config: EngineConfig) -> Result<Self, LlmError> {
        config.validate()?;
        let inner = ReqwestTransport::from_config(&config.http)?;
        Self::with_transport(config, Arc::new(inner))
    }

    /// Build a client over a caller-supplied transport.
    pub fn with_transport(
        config: EngineConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, LlmError> {
        config.validate()?;
        Ok(Self {
            transport: ResilientTransport::new(transport, config.retry.clone()),
            router: config.build_router(),
            http: config.http,
            reasoning: config.reasoning,
            collector: CollectorConfig::default(),
        })
    }

    /// Limits applied by [`generate`](Self::generate).
    pub fn with_collector_config(mut self, collector: CollectorConfig) -> Self {
        self.collector = collector;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn transport(&self) -> &ResilientTransport {
        &self.transport
    }

    fn build_request(
        &self,
        endpoint: &Endpoint,
        model: &str,
        body: Value,
        stream: bool,
    ) -> Result<TransportRequest, LlmError> {
        let dialect = endpoint.dialect;
        let model_id = model.to_string();
        // Re-serialized on every attempt.
        let body = RequestBody::factory(move || {
            let mut body = body.clone();
            dialect.prepare_body(&mut body, &model_id, stream);
            Ok(Bytes::from(serde_json::to_vec(&body)?))
        });

        let accept = match (stream, dialect.framing()) {
            (true, Framing::Sse) => "text/event-stream",
            (true, Framing::Ndjson) => "application/x-ndjson",
            (false, _) => "application/json",
        };
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        if stream && self.http.stream_disable_compression {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        }
        extend_headers(&mut headers, &self.http.headers)?;
        extend_headers(&mut headers, &endpoint.headers)?;

        Ok(TransportRequest::post(endpoint.url(model, stream))
            .with_provider(endpoint.name.clone())
            .with_headers(headers)
            .with_body(body))
    }

    /// Start a stream for `model` and return its decoder.
    ///
    /// `cancel` covers the retry loop and every later read of the body.
    pub async fn stream(
        &self,
        model: &str,
        body: impl Serialize,
        cancel: Option<&CancelHandle>,
    ) -> Result<EventStreamDecoder, LlmError> {
        let endpoint = self.router.route(model)?;
        let request = self.build_request(endpoint, model, serde_json::to_value(body)?, true)?;
        let response = self.transport.execute_with_cancel(request, cancel).await?;

        let options = DecoderOptions::new(endpoint.name.clone()).with_reasoning(self.reasoning);
        let decoder = EventStreamDecoder::from_response(response, endpoint.dialect, options);
        Ok(match cancel {
            Some(handle) => decoder.with_cancel(handle.clone()),
            None => decoder,
        })
    }

    /// Like [`stream`](Self::stream), as a `futures::Stream` of chunks.
    pub async fn chunk_stream(
        &self,
        model: &str,
        body: impl Serialize,
        cancel: Option<&CancelHandle>,
    ) -> Result<ChunkStream, LlmError> {
        Ok(self.stream(model, body, cancel).await?.into_stream())
    }

    /// Stream and collect into one result.
    pub async fn generate(
        &self,
        model: &str,
        body: impl Serialize,
        cancel: Option<&CancelHandle>,
    ) -> Result<FinalResult, LlmError> {
        self.generate_with_observer(model, body, cancel, |_| {}).await
    }

    pub async fn generate_with_observer<F>(
        &self,
        model: &str,
        body: impl Serialize,
        cancel: Option<&CancelHandle>,
        observer: F,
    ) -> Result<FinalResult, LlmError>
    where
        F: FnMut(&Chunk),
    {
        let decoder = self.stream(model, body, cancel).await?;
        StreamCollector::with_config(self.collector.clone())
            .collect_with_observer(decoder, observer)
            .await
    }

    pub async fn generate_with_callbacks(
        &self,
        model: &str,
        body: impl Serialize,
        cancel: Option<&CancelHandle>,
        callbacks: StreamCallbacks<'_>,
    ) -> Result<FinalResult, LlmError> {
        let decoder = self.stream(model, body, cancel).await?;
        StreamCollector::with_config(self.collector.clone())
            .collect_with_callbacks(decoder, callbacks)
            .await
    }

    /// Collect a [`ChatRequest`], using its own model.
    pub async fn chat(
        &self,
        request: &ChatRequest,
        cancel: Option<&CancelHandle>,
    ) -> Result<FinalResult, LlmError> {
        self.generate(&request.model, request, cancel).await
    }

    /// Non-streaming request; returns the provider's JSON response as-is.
    pub async fn send(
        &self,
        model: &str,
        body: impl Serialize,
        cancel: Option<&CancelHandle>,
    ) -> Result<Value, LlmError> {
        let endpoint = self.router.route(model)?;
        let request = self.build_request(endpoint, model, serde_json::to_value(body)?, false)?;
        let response = self.transport.execute_with_cancel(request, cancel).await?;
        run_cancellable(cancel, response.json::<Value>()).await
    }
}

fn extend_headers(
    headers: &mut HeaderMap,
    extra: &HashMap<String, String>,
) -> Result<(), LlmError> {
    for (name, value) in extra {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LlmError::ConfigurationError(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| LlmError::ConfigurationError(format!("invalid header value for {name}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(())
}
