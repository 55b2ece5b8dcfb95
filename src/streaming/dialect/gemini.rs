//! Gemini `streamGenerateContent` payloads.
//!
//! Function calls arrive whole, one part per call, so each gets its own
//! index from a running counter and its full `args` serialized as the
//! argument text.

use serde_json::Value;

use super::{DecodeContext, DialectDecoder, arguments_text, in_band_error};
use crate::error::LlmError;
use crate::streaming::fields::{self, GEMINI_USAGE};
use crate::types::{ReasoningKind, ToolCallDelta};

#[derive(Debug, Default)]
pub struct GeminiDecoder {
    next_tool_index: u32,
}

impl DialectDecoder for GeminiDecoder {
    fn decode(
        &mut self,
        _event: Option<&str>,
        payload: &Value,
        cx: &mut DecodeContext<'_>,
    ) -> Result<(), LlmError> {
        if let Some(message) = in_band_error(payload) {
            return Err(LlmError::StreamError(format!("gemini stream error: {message}")));
        }
        if let Some(id) = payload.get("responseId").and_then(Value::as_str) {
            cx.set_response_id(id);
        }
        if let Some(model) = payload.get("modelVersion").and_then(Value::as_str) {
            cx.set_model(model);
        }

        let candidates = match payload.get("candidates") {
            None | Some(Value::Null) => &[][..],
            Some(Value::Array(items)) => items.as_slice(),
            Some(other) => {
                return Err(LlmError::ParseError(format!(
                    "gemini `candidates` is not an array: {other}"
                )));
            }
        };

        // Only the first candidate is streamed.
        if let Some(candidate) = candidates.first() {
            let parts = match candidate.get("content").and_then(|c| c.get("parts")) {
                None | Some(Value::Null) => &[][..],
                Some(Value::Array(parts)) => parts.as_slice(),
                Some(other) => {
                    return Err(LlmError::ParseError(format!(
                        "gemini `parts` is not an array: {other}"
                    )));
                }
            };
            for part in parts {
                if let Some(call) = part.get("functionCall") {
                    let index = self.next_tool_index;
                    self.next_tool_index += 1;
                    let mut delta = ToolCallDelta::new(index)
                        .with_type("function")
                        .with_arguments(arguments_text(call.get("args")));
                    if let Some(name) = call.get("name").and_then(Value::as_str) {
                        delta = delta.with_function_name(name);
                    }
                    if let Some(id) = call.get("id").and_then(Value::as_str) {
                        delta = delta.with_id(id);
                    }
                    cx.tool_call(delta);
                } else if let Some(text) = part.get("text").and_then(Value::as_str) {
                    if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
                        cx.reasoning(text, ReasoningKind::Content);
                    } else {
                        cx.content(text);
                    }
                }
            }
            if let Some(reason) = candidate.get("finishReason").and_then(Value::as_str) {
                cx.finish(reason);
            }
        }

        if let Some(meta) = payload.get("usageMetadata")
            && let Some(usage) = fields::usage_from(meta, &GEMINI_USAGE)
        {
            cx.usage(usage);
        }
        Ok(())
    }
}
