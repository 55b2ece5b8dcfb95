//! Common types shared by the decoder, collector and pricing registry.

use serde::{Deserialize, Serialize};

/// Reason why the model stopped generating tokens.
///
/// Provider spellings are normalized by [`FinishReason::from_provider`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Model generated stop sequence or completed naturally.
    ///
    /// Maps to:
    /// - OpenAI: `stop`
    /// - Anthropic: `end_turn`
    /// - Gemini: `STOP`
    Stop,

    /// Model reached the maximum number of tokens.
    ///
    /// Maps to:
    /// - OpenAI: `length`
    /// - Anthropic: `max_tokens`
    /// - Gemini: `MAX_TOKENS`
    Length,

    /// Model triggered tool/function calls.
    ///
    /// Maps to:
    /// - OpenAI: `tool_calls`, `function_call`
    /// - Anthropic: `tool_use`
    ToolCalls,

    /// Content was filtered due to safety/policy violations.
    ///
    /// Maps to:
    /// - OpenAI: `content_filter`
    /// - Anthropic: `refusal`
    /// - Gemini: `SAFETY`, `RECITATION`, `PROHIBITED_CONTENT`
    ContentFilter,

    /// Anthropic's `stop_sequence`.
    StopSequence,

    /// Other provider-specific finish reason.
    Other(String),
}

impl FinishReason {
    /// Normalize a provider finish reason string.
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "STOP" | "eos" => Self::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" | "model_length" => Self::Length,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolCalls,
            "content_filter" | "refusal" | "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT"
            | "BLOCKLIST" | "SPII" => Self::ContentFilter,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Token usage snapshot.
///
/// The decoder always emits full snapshots, so consumers may overwrite any
/// previously seen value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u32>,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            reasoning_tokens: None,
            cached_tokens: None,
        }
    }

    /// Fill `total_tokens` when the provider omitted it.
    pub(crate) fn with_computed_total(mut self) -> Self {
        if self.total_tokens == 0 {
            self.total_tokens = self.prompt_tokens + self.completion_tokens;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_spellings_normalize() {
        assert_eq!(FinishReason::from_provider("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(FinishReason::from_provider("tool_use"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_provider("SAFETY"), FinishReason::ContentFilter);
        assert_eq!(
            FinishReason::from_provider("pause_turn"),
            FinishReason::Other("pause_turn".into())
        );
    }

    #[test]
    fn usage_total_is_computed_when_missing() {
        let usage = Usage {
            prompt_tokens: 3,
            completion_tokens: 4,
            ..Default::default()
        }
        .with_computed_total();
        assert_eq!(usage.total_tokens, 7);
    }
}
