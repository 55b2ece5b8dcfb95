//! OpenAI chat completions (and compatible) stream payloads.

use serde_json::Value;

use super::{DecodeContext, DialectDecoder, in_band_error};
use crate::error::LlmError;
use crate::streaming::fields::{self, OPENAI_USAGE};
use crate::types::ToolCallDelta;

#[derive(Debug, Default)]
pub struct OpenAiDecoder;

impl DialectDecoder for OpenAiDecoder {
    fn decode(
        &mut self,
        _event: Option<&str>,
        payload: &Value,
        cx: &mut DecodeContext<'_>,
    ) -> Result<(), LlmError> {
        if let Some(message) = in_band_error(payload) {
            return Err(LlmError::StreamError(format!("openai stream error: {message}")));
        }
        if !payload.is_object() {
            return Err(LlmError::ParseError(format!(
                "openai stream payload is not an object: {payload}"
            )));
        }
        if let Some(id) = payload.get("id").and_then(Value::as_str) {
            cx.set_response_id(id);
        }
        if let Some(model) = payload.get("model").and_then(Value::as_str) {
            cx.set_model(model);
        }

        match payload.get("choices") {
            None | Some(Value::Null) => {}
            Some(Value::Array(choices)) => {
                for choice in choices {
                    decode_choice(choice, cx)?;
                }
            }
            Some(other) => {
                return Err(LlmError::ParseError(format!(
                    "openai `choices` is not an array: {other}"
                )));
            }
        }

        if let Some(usage) = payload.get("usage").filter(|u| u.is_object())
            && let Some(usage) = fields::usage_from(usage, &OPENAI_USAGE)
        {
            cx.usage(usage);
        }
        Ok(())
    }
}

fn decode_choice(choice: &Value, cx: &mut DecodeContext<'_>) -> Result<(), LlmError> {
    let delta = match choice.get("delta") {
        None | Some(Value::Null) => None,
        Some(d @ Value::Object(_)) => Some(d),
        Some(other) => {
            return Err(LlmError::ParseError(format!(
                "openai `delta` is not an object: {other}"
            )));
        }
    };

    if let Some(delta) = delta {
        if cx.reasoning_enabled()
            && let Some((text, kind)) = fields::probe_reasoning(delta)
        {
            cx.reasoning(text, kind);
        }
        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            cx.content(text);
        }
        match delta.get("tool_calls") {
            None | Some(Value::Null) => {}
            Some(Value::Array(calls)) => {
                for (position, call) in calls.iter().enumerate() {
                    cx.tool_call(tool_call_delta(call, position));
                }
            }
            Some(other) => {
                return Err(LlmError::ParseError(format!(
                    "openai `tool_calls` is not an array: {other}"
                )));
            }
        }
    }

    if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
        cx.finish(reason);
    }
    Ok(())
}

fn tool_call_delta(call: &Value, position: usize) -> ToolCallDelta {
    let index = call
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|i| u32::try_from(i).ok())
        .unwrap_or(position as u32);
    let mut delta = ToolCallDelta::new(index);
    if let Some(id) = call.get("id").and_then(Value::as_str) {
        delta = delta.with_id(id);
    }
    if let Some(t) = call.get("type").and_then(Value::as_str) {
        delta = delta.with_type(t);
    }
    if let Some(function) = call.get("function") {
        if let Some(name) = function.get("name").and_then(Value::as_str)
            && !name.is_empty()
        {
            delta = delta.with_function_name(name);
        }
        if let Some(args) = function.get("arguments").and_then(Value::as_str) {
            delta = delta.with_arguments(args);
        }
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::dialect::StreamMeta;
    use crate::types::{Chunk, ChunkKind, ChunkPayload, FinishReason, ReasoningKind};
    use serde_json::json;
    use std::collections::VecDeque;

    fn decode(payload: Value, reasoning: bool) -> (Result<(), LlmError>, Vec<Chunk>, StreamMeta) {
        let mut pending = VecDeque::new();
        let mut meta = StreamMeta::default();
        let res = {
            let mut cx = DecodeContext::new(&mut pending, &mut meta, reasoning);
            OpenAiDecoder.decode(None, &payload, &mut cx)
        };
        (res, pending.into_iter().collect(), meta)
    }

    #[test]
    fn reasoning_then_content_then_tool_call_then_finish() {
        let (res, chunks, meta) = decode(
            json!({
                "id": "chatcmpl-1",
                "model": "deepseek-reasoner",
                "choices": [{
                    "index": 0,
                    "delta": {
                        "reasoning_content": "think",
                        "content": "Hi",
                        "tool_calls": [{"index": 0, "id": "call_1", "type": "function",
                                        "function": {"name": "lookup", "arguments": "{\"q\":"}}]
                    },
                    "finish_reason": "tool_calls"
                }]
            }),
            true,
        );
        res.unwrap();
        let kinds: Vec<ChunkKind> = chunks.iter().map(Chunk::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChunkKind::Reasoning,
                ChunkKind::Content,
                ChunkKind::ToolCallDelta,
                ChunkKind::Done
            ]
        );
        match &chunks[0].payload {
            ChunkPayload::Reasoning(r) => {
                assert_eq!(r.text, "think");
                assert_eq!(r.channel, ReasoningKind::Content);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        match &chunks[2].payload {
            ChunkPayload::ToolCallDelta(d) => {
                assert_eq!(d.id(), Some("call_1"));
                assert_eq!(d.function_name.as_deref(), Some("lookup"));
                assert_eq!(d.arguments_delta, "{\"q\":");
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(!chunks[3].done);
        assert_eq!(meta.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(meta.model.as_deref(), Some("deepseek-reasoner"));
        assert_eq!(meta.response_id.as_deref(), Some("chatcmpl-1"));
    }

    #[test]
    fn reasoning_is_dropped_when_disabled() {
        let (res, chunks, _) = decode(
            json!({"choices": [{"delta": {"reasoning_content": "think", "content": "x"}}]}),
            false,
        );
        res.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text(), Some("x"));
    }

    #[test]
    fn usage_only_event_becomes_usage_chunk() {
        let (res, chunks, meta) = decode(
            json!({"choices": [], "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}}),
            true,
        );
        res.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind(), ChunkKind::Usage);
        assert_eq!(meta.usage.map(|u| u.total_tokens), Some(5));
    }

    #[test]
    fn malformed_choices_and_in_band_errors_fail() {
        let (res, _, _) = decode(json!({"choices": {"0": {}}}), true);
        assert!(matches!(res, Err(LlmError::ParseError(_))));

        let (res, _, _) = decode(json!({"error": {"message": "overloaded", "type": "server_error"}}), true);
        match res {
            Err(LlmError::StreamError(msg)) => assert!(msg.contains("overloaded")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
