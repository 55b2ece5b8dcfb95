//! # Siumai Engine - Resilient Transport and Response Streaming
//!
//! The request/response core of a unified LLM client: it sends a request with
//! retries, decodes the provider's event stream into typed chunks, and folds
//! those chunks into one result.
//!
//! ## Components
//!
//! - **Resilient Transport**: bounded retries with exponential backoff, jitter,
//!   `retry-after` hints and cancellation ([`transport`], [`retry`]).
//! - **Event Stream Decoder**: SSE and NDJSON framing, per-provider dialects,
//!   reasoning and tool-call deltas ([`streaming::EventStreamDecoder`]).
//! - **Stream Collector**: reassembles interleaved tool calls and joins text
//!   ([`streaming::collector`]).
//! - **JSON Repair**: closes truncated tool-call arguments
//!   ([`streaming::json_repair`]).
//! - **Router**: picks the endpoint for a model ([`routing`]).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use siumai_engine::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LlmError> {
//!     let config = EngineConfig::new().with_endpoint(
//!         Endpoint::new("openai", "https://api.openai.com/v1", Dialect::OpenAi)
//!             .with_header("authorization", "Bearer your-api-key"),
//!     );
//!     let client = StreamingClient::new(config)?;
//!
//!     let request = ChatRequest::new("gpt-4o-mini").message(ChatMessage::user("Hello"));
//!     let mut decoder = client.stream("gpt-4o-mini", &request, None).await?;
//!     while let Some(chunk) = decoder.next().await? {
//!         if let Some(text) = chunk.text() {
//!             print!("{text}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod defaults;
pub mod error;
pub mod observability;
pub mod pricing;
pub mod retry;
pub mod retry_api;
pub mod routing;
pub mod streaming;
pub mod transport;
pub mod types;
pub mod utils;

pub use client::StreamingClient;
pub use config::EngineConfig;
pub use error::{ErrorCategory, LlmError};
pub use retry::RetryPolicy;
pub use utils::cancel::CancelHandle;

/// Commonly used types.
pub mod prelude {
    pub use crate::client::StreamingClient;
    pub use crate::config::EngineConfig;
    pub use crate::error::{ErrorCategory, LlmError};
    pub use crate::pricing::{ModelPricing, PricingRegistry};
    pub use crate::retry::RetryPolicy;
    pub use crate::retry_api::retry_with;
    pub use crate::routing::{Endpoint, FallbackPolicy, RouteTable, Router};
    pub use crate::streaming::{
        CollectorConfig, DecoderOptions, Dialect, EventStreamDecoder, FinalResult,
        StreamCallbacks, StreamCollector, repair_json,
    };
    pub use crate::transport::{HttpTransport, RequestBody, ResilientTransport, TransportRequest};
    pub use crate::types::{
        ChatMessage, ChatRequest, Chunk, ChunkKind, ChunkPayload, ExtendedRequest, FinishReason,
        HttpConfig, Usage,
    };
    pub use crate::utils::cancel::CancelHandle;
}
