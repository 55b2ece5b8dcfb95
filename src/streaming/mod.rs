//! Streaming Module
//!
//! Turns a provider's response body into typed [`Chunk`]s and folds them into
//! a [`FinalResult`]:
//! - Line framing for SSE and NDJSON bodies
//! - Dialect decoders for each provider's payload shape
//! - Field probing across provider spellings
//! - A collector that reassembles interleaved tool calls
//! - Repair for truncated JSON arguments

use futures::Stream;
use std::pin::Pin;

use crate::error::LlmError;
use crate::types::Chunk;

pub mod collector;
pub mod decoder;
pub mod dialect;
pub mod fields;
pub mod json_repair;

/// Boxed stream of decoded chunks, ending with the terminal chunk.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk, LlmError>> + Send>>;

pub use collector::{
    AccumulatedToolCall, CollectorConfig, FinalResult, OverflowHandler, StreamCallbacks,
    StreamCollector, collect, collect_with_callbacks, collect_with_observer,
};
pub use decoder::{DecoderOptions, EventStreamDecoder};
pub use dialect::{DecodeContext, Dialect, DialectDecoder, Framing, StreamMeta};
pub use json_repair::repair_json;
