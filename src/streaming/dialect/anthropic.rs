//! Anthropic messages stream payloads.
//!
//! Tool-call ids arrive once, on `content_block_start`; later
//! `input_json_delta` events only carry the block index, so the decoder keeps
//! an index → id map. Usage is split across `message_start` (input side) and
//! `message_delta` (output side) and merged into one snapshot.

use serde_json::Value;
use std::collections::HashMap;

use super::{DecodeContext, DialectDecoder, arguments_text, in_band_error};
use crate::error::LlmError;
use crate::streaming::fields::{self, ANTHROPIC_USAGE};
use crate::types::{ReasoningKind, ToolCallDelta, Usage};

#[derive(Debug, Default)]
pub struct AnthropicDecoder {
    tool_ids: HashMap<u32, String>,
    usage: Option<Usage>,
}

impl AnthropicDecoder {
    fn merge_usage(&mut self, value: &Value) -> Option<Usage> {
        let update = fields::usage_from(value, &ANTHROPIC_USAGE)?;
        let has = |key: &str| value.get(key).is_some_and(|v| v.is_u64());
        let merged = match self.usage.take() {
            None => update,
            Some(mut prev) => {
                if has("input_tokens") {
                    prev.prompt_tokens = update.prompt_tokens;
                }
                if has("output_tokens") {
                    prev.completion_tokens = update.completion_tokens;
                }
                if update.cached_tokens.is_some() {
                    prev.cached_tokens = update.cached_tokens;
                }
                prev.total_tokens = prev.prompt_tokens + prev.completion_tokens;
                prev
            }
        };
        self.usage = Some(merged.clone());
        Some(merged)
    }
}

fn block_index(payload: &Value) -> Result<u32, LlmError> {
    payload
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|i| u32::try_from(i).ok())
        .ok_or_else(|| LlmError::ParseError(format!("anthropic event without block index: {payload}")))
}

impl DialectDecoder for AnthropicDecoder {
    fn decode(
        &mut self,
        event: Option<&str>,
        payload: &Value,
        cx: &mut DecodeContext<'_>,
    ) -> Result<(), LlmError> {
        let event_type = payload
            .get("type")
            .and_then(Value::as_str)
            .or(event)
            .ok_or_else(|| LlmError::ParseError(format!("anthropic event without type: {payload}")))?;

        match event_type {
            "error" => {
                let message = in_band_error(payload).unwrap_or_else(|| payload.to_string());
                Err(LlmError::StreamError(format!("anthropic stream error: {message}")))
            }
            "message_start" => {
                let message = payload.get("message").ok_or_else(|| {
                    LlmError::ParseError("anthropic message_start without message".to_string())
                })?;
                if let Some(id) = message.get("id").and_then(Value::as_str) {
                    cx.set_response_id(id);
                }
                if let Some(model) = message.get("model").and_then(Value::as_str) {
                    cx.set_model(model);
                }
                if let Some(usage) = message.get("usage")
                    && let Some(merged) = self.merge_usage(usage)
                {
                    cx.usage(merged);
                }
                Ok(())
            }
            "content_block_start" => {
                let index = block_index(payload)?;
                let block = payload.get("content_block").ok_or_else(|| {
                    LlmError::ParseError("anthropic content_block_start without block".to_string())
                })?;
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_use") | Some("server_tool_use") => {
                        let id = block.get("id").and_then(Value::as_str).unwrap_or_default();
                        let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                        self.tool_ids.insert(index, id.to_string());
                        let mut delta = ToolCallDelta::new(index)
                            .with_id(id)
                            .with_type("function")
                            .with_function_name(name);
                        // Input is normally streamed; an eager non-empty object is kept.
                        if let Some(input) = block.get("input")
                            && input.as_object().is_some_and(|o| !o.is_empty())
                        {
                            delta = delta.with_arguments(arguments_text(Some(input)));
                        }
                        cx.tool_call(delta);
                    }
                    Some("text") => {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            cx.content(text);
                        }
                    }
                    Some("thinking") => {
                        if let Some(text) = block.get("thinking").and_then(Value::as_str) {
                            cx.reasoning(text, ReasoningKind::Content);
                        }
                    }
                    _ => {}
                }
                Ok(())
            }
            "content_block_delta" => {
                let index = block_index(payload)?;
                let delta = payload.get("delta").ok_or_else(|| {
                    LlmError::ParseError("anthropic content_block_delta without delta".to_string())
                })?;
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            cx.content(text);
                        }
                    }
                    Some("thinking_delta") => {
                        if let Some(text) = delta.get("thinking").and_then(Value::as_str) {
                            cx.reasoning(text, ReasoningKind::Content);
                        }
                    }
                    Some("input_json_delta") => {
                        let partial = delta
                            .get("partial_json")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        let mut call = ToolCallDelta::new(index).with_arguments(partial);
                        if let Some(id) = self.tool_ids.get(&index) {
                            call = call.with_id(id.clone());
                        }
                        cx.tool_call(call);
                    }
                    // signature_delta, citations_delta, ...
                    _ => {}
                }
                Ok(())
            }
            "message_delta" => {
                if let Some(reason) = payload
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(Value::as_str)
                {
                    cx.finish(reason);
                }
                if let Some(usage) = payload.get("usage")
                    && let Some(merged) = self.merge_usage(usage)
                {
                    cx.usage(merged);
                }
                Ok(())
            }
            "message_stop" => {
                cx.end();
                Ok(())
            }
            // ping, content_block_stop, and future event types
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::dialect::StreamMeta;
    use crate::types::{Chunk, ChunkKind, ChunkPayload, FinishReason};
    use serde_json::json;
    use std::collections::VecDeque;

    fn run(events: Vec<Value>) -> (Vec<Chunk>, StreamMeta) {
        let mut decoder = AnthropicDecoder::default();
        let mut pending = VecDeque::new();
        let mut meta = StreamMeta::default();
        for event in events {
            let mut cx = DecodeContext::new(&mut pending, &mut meta, true);
            decoder.decode(None, &event, &mut cx).unwrap();
        }
        (pending.into_iter().collect(), meta)
    }

    #[test]
    fn tool_use_deltas_carry_the_block_id() {
        let (chunks, meta) = run(vec![
            json!({"type": "message_start", "message": {"id": "msg_1", "model": "claude-sonnet-4",
                   "usage": {"input_tokens": 12, "output_tokens": 1}}}),
            json!({"type": "content_block_start", "index": 1,
                   "content_block": {"type": "tool_use", "id": "toolu_1", "name": "search", "input": {}}}),
            json!({"type": "content_block_delta", "index": 1,
                   "delta": {"type": "input_json_delta", "partial_json": "{\"q\":"}}),
            json!({"type": "content_block_delta", "index": 1,
                   "delta": {"type": "input_json_delta", "partial_json": "\"rust\"}"}}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"},
                   "usage": {"output_tokens": 30}}),
            json!({"type": "message_stop"}),
        ]);

        let ids: Vec<Option<&str>> = chunks
            .iter()
            .filter_map(|c| match &c.payload {
                ChunkPayload::ToolCallDelta(d) => Some(d.id()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec![Some("toolu_1"); 3]);
        assert!(meta.ended);
        assert_eq!(meta.finish_reason, Some(FinishReason::ToolCalls));
        let usage = meta.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 30);
        assert_eq!(usage.total_tokens, 42);
        assert_eq!(meta.response_id.as_deref(), Some("msg_1"));
    }

    #[test]
    fn text_and_thinking_deltas() {
        let (chunks, _) = run(vec![
            json!({"type": "content_block_delta", "index": 0,
                   "delta": {"type": "thinking_delta", "thinking": "hmm"}}),
            json!({"type": "content_block_delta", "index": 1,
                   "delta": {"type": "text_delta", "text": "Hello"}}),
            json!({"type": "ping"}),
        ]);
        let kinds: Vec<ChunkKind> = chunks.iter().map(Chunk::kind).collect();
        assert_eq!(kinds, vec![ChunkKind::Reasoning, ChunkKind::Content]);
    }

    #[test]
    fn error_event_and_untyped_payload_fail() {
        let mut decoder = AnthropicDecoder::default();
        let mut pending = VecDeque::new();
        let mut meta = StreamMeta::default();
        let mut cx = DecodeContext::new(&mut pending, &mut meta, true);
        let err = decoder
            .decode(
                None,
                &json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
                &mut cx,
            )
            .unwrap_err();
        assert!(matches!(err, LlmError::StreamError(msg) if msg.contains("Overloaded")));

        let err = decoder.decode(None, &json!({"index": 0}), &mut cx).unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
    }
}
