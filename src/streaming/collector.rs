//! Stream Collector
//!
//! Drains a decoder (or any chunk stream) into one [`FinalResult`], merging
//! concurrently building tool calls and enforcing optional buffer limits.
//!
//! Tool-call deltas are keyed by `id` when present, otherwise by `index`. An
//! id-bearing delta adopts the anonymous entry at its index, which covers
//! providers that withhold the id until the last delta. Calls are returned in
//! the order their first delta arrived.

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::ChunkStream;
use super::decoder::EventStreamDecoder;
use super::json_repair::repair_json;
use crate::error::LlmError;
use crate::types::{Chunk, ChunkPayload, FinishReason, ReasoningKind, ToolCallDelta, Usage};

/// Overflow handler callback type
///
/// Called when a buffer exceeds its configured limit.
/// Parameters: (buffer_name, attempted_size)
pub type OverflowHandler = Arc<dyn Fn(&str, usize) + Send + Sync>;

/// Collector configuration. All limits are off by default.
#[derive(Clone, Default)]
pub struct CollectorConfig {
    /// Maximum size for the content buffer (in bytes)
    pub max_content_bytes: Option<usize>,
    /// Maximum size for each reasoning buffer (in bytes)
    pub max_reasoning_bytes: Option<usize>,
    /// Maximum number of tool calls to track
    pub max_tool_calls: Option<usize>,
    /// Maximum accumulated size for a single tool call's arguments (in bytes)
    pub max_tool_arguments_bytes: Option<usize>,
    /// Handler for buffer overflow
    pub overflow_handler: Option<OverflowHandler>,
}

impl std::fmt::Debug for CollectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorConfig")
            .field("max_content_bytes", &self.max_content_bytes)
            .field("max_reasoning_bytes", &self.max_reasoning_bytes)
            .field("max_tool_calls", &self.max_tool_calls)
            .field("max_tool_arguments_bytes", &self.max_tool_arguments_bytes)
            .field("has_overflow_handler", &self.overflow_handler.is_some())
            .finish()
    }
}

impl CollectorConfig {
    pub fn with_max_content_bytes(mut self, max: usize) -> Self {
        self.max_content_bytes = Some(max);
        self
    }

    pub fn with_max_reasoning_bytes(mut self, max: usize) -> Self {
        self.max_reasoning_bytes = Some(max);
        self
    }

    pub fn with_max_tool_calls(mut self, max: usize) -> Self {
        self.max_tool_calls = Some(max);
        self
    }

    pub fn with_max_tool_arguments_bytes(mut self, max: usize) -> Self {
        self.max_tool_arguments_bytes = Some(max);
        self
    }

    pub fn with_overflow_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, usize) + Send + Sync + 'static,
    {
        self.overflow_handler = Some(Arc::new(handler));
        self
    }

    fn overflow(&self, buffer: &str, attempted: usize, limit: usize) {
        tracing::warn!(buffer, attempted, limit, "stream buffer limit exceeded, truncating");
        if let Some(handler) = &self.overflow_handler {
            handler(buffer, attempted);
        }
    }
}

/// One reassembled tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccumulatedToolCall {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub call_type: Option<String>,
    pub function_name: Option<String>,
    /// Concatenation of every argument delta, in arrival order.
    pub arguments: String,
    /// Index of the most recent delta for this call.
    pub index: u32,
}

impl AccumulatedToolCall {
    /// Arguments as JSON, repairing a truncated document if needed.
    pub fn parsed_arguments(&self) -> Option<Value> {
        repair_json(&self.arguments)
    }
}

/// Everything a stream produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinalResult {
    pub text: String,
    pub reasoning: String,
    pub reasoning_summary: String,
    pub tool_calls: Vec<AccumulatedToolCall>,
    pub usage: Option<Usage>,
    pub provider: String,
    pub model: Option<String>,
    pub response_id: Option<String>,
    pub finish_reason: Option<FinishReason>,
}

impl FinalResult {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn reasoning_text(&self) -> Option<&str> {
        if !self.reasoning.is_empty() {
            Some(&self.reasoning)
        } else if !self.reasoning_summary.is_empty() {
            Some(&self.reasoning_summary)
        } else {
            None
        }
    }
}

type ContentCallback<'a> = Box<dyn FnMut(&str) + Send + 'a>;
type ReasoningCallback<'a> = Box<dyn FnMut(&str, ReasoningKind) + Send + 'a>;
type ToolCallCallback<'a> = Box<dyn FnMut(&ToolCallDelta) + Send + 'a>;

/// Per-kind observers for [`StreamCollector::collect_with_callbacks`].
#[derive(Default)]
pub struct StreamCallbacks<'a> {
    on_content: Option<ContentCallback<'a>>,
    on_reasoning: Option<ReasoningCallback<'a>>,
    on_tool_call: Option<ToolCallCallback<'a>>,
}

impl<'a> StreamCallbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_content(mut self, f: impl FnMut(&str) + Send + 'a) -> Self {
        self.on_content = Some(Box::new(f));
        self
    }

    pub fn on_reasoning(mut self, f: impl FnMut(&str, ReasoningKind) + Send + 'a) -> Self {
        self.on_reasoning = Some(Box::new(f));
        self
    }

    pub fn on_tool_call(mut self, f: impl FnMut(&ToolCallDelta) + Send + 'a) -> Self {
        self.on_tool_call = Some(Box::new(f));
        self
    }

    fn dispatch(&mut self, chunk: &Chunk) {
        match &chunk.payload {
            ChunkPayload::Content { delta } => {
                if let Some(f) = self.on_content.as_mut() {
                    f(delta);
                }
            }
            ChunkPayload::Reasoning(r) => {
                if let Some(f) = self.on_reasoning.as_mut() {
                    f(&r.text, r.channel);
                }
            }
            ChunkPayload::ToolCallDelta(d) => {
                if let Some(f) = self.on_tool_call.as_mut() {
                    f(d);
                }
            }
            ChunkPayload::Usage(_) | ChunkPayload::Done { .. } => {}
        }
    }
}

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: Vec<AccumulatedToolCall>,
    by_id: HashMap<String, usize>,
    /// Index → most recent entry at that index.
    by_index: HashMap<u32, usize>,
}

impl ToolCallAccumulator {
    fn slot_for(&mut self, delta: &ToolCallDelta, config: &CollectorConfig) -> Option<usize> {
        if let Some(id) = delta.id() {
            if let Some(&slot) = self.by_id.get(id) {
                return Some(slot);
            }
            if let Some(&slot) = self.by_index.get(&delta.index)
                && self.calls[slot].id.is_none()
            {
                self.calls[slot].id = Some(id.to_string());
                self.by_id.insert(id.to_string(), slot);
                return Some(slot);
            }
        } else if let Some(&slot) = self.by_index.get(&delta.index) {
            return Some(slot);
        }

        if let Some(max) = config.max_tool_calls
            && self.calls.len() >= max
        {
            config.overflow("tool_calls", self.calls.len() + 1, max);
            return None;
        }
        let slot = self.calls.len();
        self.calls.push(AccumulatedToolCall {
            id: delta.id().map(str::to_string),
            index: delta.index,
            ..Default::default()
        });
        if let Some(id) = delta.id() {
            self.by_id.insert(id.to_string(), slot);
        }
        Some(slot)
    }

    fn apply(&mut self, delta: &ToolCallDelta, config: &CollectorConfig) {
        let Some(slot) = self.slot_for(delta, config) else {
            return;
        };
        self.by_index.insert(delta.index, slot);
        let call = &mut self.calls[slot];
        call.index = delta.index;
        if let Some(t) = &delta.call_type {
            call.call_type = Some(t.clone());
        }
        if let Some(name) = delta.function_name.as_deref().filter(|n| !n.is_empty()) {
            call.function_name = Some(name.to_string());
        }
        append_limited(
            &mut call.arguments,
            &delta.arguments_delta,
            config.max_tool_arguments_bytes,
            config,
            "tool_arguments",
        );
    }
}

/// Append `delta`, truncating at a char boundary once `limit` bytes are reached.
fn append_limited(
    buf: &mut String,
    delta: &str,
    limit: Option<usize>,
    config: &CollectorConfig,
    name: &str,
) {
    let Some(max) = limit else {
        buf.push_str(delta);
        return;
    };
    let attempted = buf.len() + delta.len();
    if attempted <= max {
        buf.push_str(delta);
        return;
    }
    config.overflow(name, attempted, max);
    let mut available = max.saturating_sub(buf.len());
    while available > 0 && !delta.is_char_boundary(available) {
        available -= 1;
    }
    buf.push_str(&delta[..available]);
}

/// Accumulates chunks into a [`FinalResult`].
#[derive(Debug, Default)]
pub struct StreamCollector {
    config: CollectorConfig,
    content: String,
    reasoning: String,
    reasoning_summary: String,
    tools: ToolCallAccumulator,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CollectorConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Fold one chunk into the accumulated state.
    pub fn push(&mut self, chunk: &Chunk) {
        match &chunk.payload {
            ChunkPayload::Content { delta } => {
                append_limited(
                    &mut self.content,
                    delta,
                    self.config.max_content_bytes,
                    &self.config,
                    "content",
                );
            }
            ChunkPayload::Reasoning(r) => {
                let (buf, name) = match r.channel {
                    ReasoningKind::Content => (&mut self.reasoning, "reasoning"),
                    ReasoningKind::Summary => (&mut self.reasoning_summary, "reasoning_summary"),
                };
                if !buf.is_empty() {
                    append_limited(buf, "\n", self.config.max_reasoning_bytes, &self.config, name);
                }
                append_limited(buf, &r.text, self.config.max_reasoning_bytes, &self.config, name);
            }
            ChunkPayload::ToolCallDelta(delta) => self.tools.apply(delta, &self.config),
            ChunkPayload::Usage(usage) => self.usage = Some(usage.clone()),
            ChunkPayload::Done { usage } => {
                if let Some(usage) = usage {
                    self.usage = Some(usage.clone());
                }
            }
        }
        if let Some(reason) = &chunk.finish_reason {
            self.finish_reason = Some(reason.clone());
        }
    }

    /// Snapshot of the tool calls accumulated so far.
    pub fn tool_calls(&self) -> &[AccumulatedToolCall] {
        &self.tools.calls
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Build the result. Identifiers are taken from the caller.
    pub fn finish(
        self,
        provider: impl Into<String>,
        model: Option<String>,
        response_id: Option<String>,
    ) -> FinalResult {
        FinalResult {
            text: self.content,
            reasoning: self.reasoning,
            reasoning_summary: self.reasoning_summary,
            tool_calls: self.tools.calls,
            usage: self.usage,
            provider: provider.into(),
            model,
            response_id,
            finish_reason: self.finish_reason,
        }
    }

    pub async fn collect(self, decoder: EventStreamDecoder) -> Result<FinalResult, LlmError> {
        self.collect_with_observer(decoder, |_| {}).await
    }

    /// Observers see each chunk before it is folded into the result.
    pub async fn collect_with_observer<F>(
        mut self,
        mut decoder: EventStreamDecoder,
        mut observer: F,
    ) -> Result<FinalResult, LlmError>
    where
        F: FnMut(&Chunk),
    {
        while let Some(chunk) = decoder.next().await? {
            observer(&chunk);
            self.push(&chunk);
        }
        tracing::debug!(
            provider = decoder.provider_id(),
            content_bytes = self.content.len(),
            tool_calls = self.tools.calls.len(),
            "stream collected"
        );
        Ok(self.finish(
            decoder.provider_id(),
            decoder.model().map(str::to_string),
            decoder.response_id().map(str::to_string),
        ))
    }

    pub async fn collect_with_callbacks(
        self,
        decoder: EventStreamDecoder,
        mut callbacks: StreamCallbacks<'_>,
    ) -> Result<FinalResult, LlmError> {
        self.collect_with_observer(decoder, |chunk| callbacks.dispatch(chunk))
            .await
    }

    /// Drain an arbitrary chunk stream. Stops at the terminal chunk.
    pub async fn collect_stream<F>(
        mut self,
        mut stream: ChunkStream,
        provider: impl Into<String>,
        mut observer: F,
    ) -> Result<FinalResult, LlmError>
    where
        F: FnMut(&Chunk),
    {
        while let Some(item) = stream.next().await {
            let chunk = item?;
            observer(&chunk);
            self.push(&chunk);
            if chunk.is_terminal() {
                break;
            }
        }
        Ok(self.finish(provider, None, None))
    }
}

/// Drain `decoder` with default limits.
pub async fn collect(decoder: EventStreamDecoder) -> Result<FinalResult, LlmError> {
    StreamCollector::new().collect(decoder).await
}

pub async fn collect_with_observer<F>(
    decoder: EventStreamDecoder,
    observer: F,
) -> Result<FinalResult, LlmError>
where
    F: FnMut(&Chunk),
{
    StreamCollector::new()
        .collect_with_observer(decoder, observer)
        .await
}

pub async fn collect_with_callbacks(
    decoder: EventStreamDecoder,
    callbacks: StreamCallbacks<'_>,
) -> Result<FinalResult, LlmError> {
    StreamCollector::new()
        .collect_with_callbacks(decoder, callbacks)
        .await
}
