//! Core data types shared across the engine.

pub mod chat;
pub mod common;
pub mod http;
pub mod streaming;

pub use chat::{ChatMessage, ChatRequest, ExtendedRequest, MessageRole};
pub use common::{FinishReason, Usage};
pub use http::{HttpConfig, HttpConfigBuilder};
pub use streaming::{
    Chunk, ChunkKind, ChunkPayload, ReasoningDelta, ReasoningKind, ToolCallDelta,
};
