//! Ollama `/api/chat` NDJSON payloads.

use serde_json::Value;

use super::{DecodeContext, DialectDecoder, arguments_text, in_band_error};
use crate::error::LlmError;
use crate::streaming::fields::{self, OLLAMA_USAGE};
use crate::types::ToolCallDelta;

#[derive(Debug, Default)]
pub struct OllamaDecoder {
    next_tool_index: u32,
}

impl DialectDecoder for OllamaDecoder {
    fn decode(
        &mut self,
        _event: Option<&str>,
        payload: &Value,
        cx: &mut DecodeContext<'_>,
    ) -> Result<(), LlmError> {
        if let Some(message) = in_band_error(payload) {
            return Err(LlmError::StreamError(format!("ollama stream error: {message}")));
        }
        if let Some(model) = payload.get("model").and_then(Value::as_str) {
            cx.set_model(model);
        }

        match payload.get("message") {
            None | Some(Value::Null) => {}
            Some(message @ Value::Object(_)) => {
                if cx.reasoning_enabled()
                    && let Some((text, kind)) = fields::probe_reasoning(message)
                {
                    cx.reasoning(text, kind);
                }
                if let Some(text) = message.get("content").and_then(Value::as_str) {
                    cx.content(text);
                }
                if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
                    for call in calls {
                        let function = call.get("function").unwrap_or(&Value::Null);
                        let index = self.next_tool_index;
                        self.next_tool_index += 1;
                        let mut delta = ToolCallDelta::new(index)
                            .with_type("function")
                            .with_arguments(arguments_text(function.get("arguments")));
                        if let Some(name) = function.get("name").and_then(Value::as_str) {
                            delta = delta.with_function_name(name);
                        }
                        if let Some(id) = call.get("id").and_then(Value::as_str) {
                            delta = delta.with_id(id);
                        }
                        cx.tool_call(delta);
                    }
                }
            }
            Some(other) => {
                return Err(LlmError::ParseError(format!(
                    "ollama `message` is not an object: {other}"
                )));
            }
        }

        if payload.get("done").and_then(Value::as_bool).unwrap_or(false) {
            let reason = payload
                .get("done_reason")
                .and_then(Value::as_str)
                .unwrap_or("stop");
            cx.finish(reason);
            if let Some(usage) = fields::usage_from(payload, &OLLAMA_USAGE) {
                cx.usage(usage);
            }
            cx.end();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::dialect::StreamMeta;
    use crate::types::{ChunkKind, FinishReason};
    use serde_json::json;
    use std::collections::VecDeque;

    #[test]
    fn done_line_finishes_with_usage_and_ends() {
        let mut decoder = OllamaDecoder::default();
        let mut pending = VecDeque::new();
        let mut meta = StreamMeta::default();
        {
            let mut cx = DecodeContext::new(&mut pending, &mut meta, true);
            decoder
                .decode(
                    None,
                    &json!({"model": "llama3", "message": {"role": "assistant", "content": "Hi", "thinking": "ok"}, "done": false}),
                    &mut cx,
                )
                .unwrap();
            decoder
                .decode(
                    None,
                    &json!({"model": "llama3", "message": {"role": "assistant", "content": ""},
                            "done": true, "done_reason": "length", "prompt_eval_count": 7, "eval_count": 9}),
                    &mut cx,
                )
                .unwrap();
        }
        let kinds: Vec<ChunkKind> = pending.iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ChunkKind::Reasoning,
                ChunkKind::Content,
                ChunkKind::Done,
                ChunkKind::Usage
            ]
        );
        assert!(meta.ended);
        assert_eq!(meta.finish_reason, Some(FinishReason::Length));
        assert_eq!(meta.usage.map(|u| u.total_tokens), Some(16));
        assert_eq!(meta.model.as_deref(), Some("llama3"));
    }

    #[test]
    fn tool_calls_are_indexed_in_arrival_order() {
        let mut decoder = OllamaDecoder::default();
        let mut pending = VecDeque::new();
        let mut meta = StreamMeta::default();
        let mut cx = DecodeContext::new(&mut pending, &mut meta, true);
        decoder
            .decode(
                None,
                &json!({"message": {"tool_calls": [
                    {"function": {"name": "a", "arguments": {"x": 1}}},
                    {"function": {"name": "b", "arguments": {}}}
                ]}}),
                &mut cx,
            )
            .unwrap();
        let err = decoder
            .decode(None, &json!({"message": "oops"}), &mut cx)
            .unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
        drop(cx);
        assert_eq!(pending.len(), 2);
    }
}
