//! Provider wire dialects.
//!
//! A dialect knows how one provider frames its stream (SSE or NDJSON), where
//! its endpoints live, and how a parsed JSON payload maps onto canonical
//! [`Chunk`]s. Dialect decoders push chunks into a [`DecodeContext`]; the
//! [`EventStreamDecoder`](super::EventStreamDecoder) owns everything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

use crate::error::LlmError;
use crate::types::{Chunk, FinishReason, ReasoningKind, ToolCallDelta, Usage};

mod anthropic;
mod gemini;
mod ollama;
mod openai;

pub use anthropic::AnthropicDecoder;
pub use gemini::GeminiDecoder;
pub use ollama::OllamaDecoder;
pub use openai::OpenAiDecoder;

/// How events are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-Sent Events: payloads arrive on `data:` lines.
    Sse,
    /// One JSON document per line.
    Ndjson,
}

/// Supported provider dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// OpenAI chat completions and compatible APIs.
    #[serde(rename = "openai", alias = "openai_compatible")]
    OpenAi,
    /// Anthropic messages.
    Anthropic,
    /// Gemini `streamGenerateContent?alt=sse`.
    Gemini,
    /// Ollama `/api/chat` NDJSON.
    Ollama,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    pub fn framing(self) -> Framing {
        match self {
            Self::Ollama => Framing::Ndjson,
            _ => Framing::Sse,
        }
    }

    /// Path appended to the endpoint's base URL.
    pub fn path(self, model: &str, stream: bool) -> String {
        match self {
            Self::OpenAi => "/chat/completions".to_string(),
            Self::Anthropic => "/messages".to_string(),
            Self::Gemini if stream => format!("/models/{model}:streamGenerateContent?alt=sse"),
            Self::Gemini => format!("/models/{model}:generateContent"),
            Self::Ollama => "/api/chat".to_string(),
        }
    }

    /// Set the fields this dialect expects for model selection and streaming.
    pub fn prepare_body(self, body: &mut Value, model: &str, stream: bool) {
        let Some(obj) = body.as_object_mut() else {
            return;
        };
        match self {
            Self::Gemini => {
                obj.remove("model");
                obj.remove("stream");
            }
            Self::OpenAi => {
                obj.insert("model".into(), Value::String(model.to_string()));
                obj.insert("stream".into(), Value::Bool(stream));
                if stream && !obj.contains_key("stream_options") {
                    obj.insert(
                        "stream_options".into(),
                        serde_json::json!({ "include_usage": true }),
                    );
                }
            }
            Self::Anthropic | Self::Ollama => {
                obj.insert("model".into(), Value::String(model.to_string()));
                obj.insert("stream".into(), Value::Bool(stream));
            }
        }
    }

    /// A fresh per-stream decoder for this dialect.
    pub fn decoder(self) -> Box<dyn DialectDecoder> {
        match self {
            Self::OpenAi => Box::new(OpenAiDecoder),
            Self::Anthropic => Box::new(AnthropicDecoder::default()),
            Self::Gemini => Box::new(GeminiDecoder::default()),
            Self::Ollama => Box::new(OllamaDecoder::default()),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Metadata accumulated while decoding one stream.
#[derive(Debug, Clone, Default)]
pub struct StreamMeta {
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
    pub model: Option<String>,
    pub response_id: Option<String>,
    /// The protocol signalled the end of the stream in-band.
    pub ended: bool,
}

/// Sink for chunks produced from one payload.
pub struct DecodeContext<'a> {
    pending: &'a mut VecDeque<Chunk>,
    meta: &'a mut StreamMeta,
    reasoning: bool,
}

impl<'a> DecodeContext<'a> {
    pub(crate) fn new(
        pending: &'a mut VecDeque<Chunk>,
        meta: &'a mut StreamMeta,
        reasoning: bool,
    ) -> Self {
        Self {
            pending,
            meta,
            reasoning,
        }
    }

    pub fn content(&mut self, text: &str) {
        if !text.is_empty() {
            self.pending.push_back(Chunk::content(text));
        }
    }

    /// Dropped when reasoning extraction is disabled for this request.
    pub fn reasoning(&mut self, text: &str, kind: ReasoningKind) {
        if self.reasoning && !text.is_empty() {
            self.pending.push_back(Chunk::reasoning(text, kind));
        }
    }

    pub fn reasoning_enabled(&self) -> bool {
        self.reasoning
    }

    pub fn tool_call(&mut self, delta: ToolCallDelta) {
        self.pending.push_back(Chunk::tool_call(delta));
    }

    /// Record a full usage snapshot and surface it as a usage chunk.
    pub fn usage(&mut self, usage: Usage) {
        self.meta.usage = Some(usage.clone());
        self.pending.push_back(Chunk::usage(usage));
    }

    /// Provider finish reason. Emits a non-terminal finish marker.
    pub fn finish(&mut self, raw: &str) {
        let reason = FinishReason::from_provider(raw);
        self.meta.finish_reason = Some(reason.clone());
        self.pending.push_back(Chunk::finish(reason));
    }

    /// The payload ended the stream in-band.
    pub fn end(&mut self) {
        self.meta.ended = true;
    }

    pub fn set_model(&mut self, model: &str) {
        if !model.is_empty() {
            self.meta.model = Some(model.to_string());
        }
    }

    pub fn set_response_id(&mut self, id: &str) {
        if !id.is_empty() {
            self.meta.response_id = Some(id.to_string());
        }
    }

    pub fn meta(&self) -> &StreamMeta {
        self.meta
    }
}

/// Maps parsed payloads of one dialect onto canonical chunks.
pub trait DialectDecoder: Send {
    /// Decode one payload. `event` is the most recent SSE `event:` name.
    ///
    /// Payloads that parse as JSON but are malformed for the dialect, and
    /// in-band error objects, return an error.
    fn decode(
        &mut self,
        event: Option<&str>,
        payload: &Value,
        cx: &mut DecodeContext<'_>,
    ) -> Result<(), LlmError>;
}

/// Message of an in-band error object (`{"error": {...}}` or `{"error": "..."}`).
pub(crate) fn in_band_error(payload: &Value) -> Option<String> {
    match payload.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(
            other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

/// Serialize tool arguments delivered as a JSON value.
pub(crate) fn arguments_text(args: Option<&Value>) -> String {
    match args {
        None | Some(Value::Null) => "{}".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
