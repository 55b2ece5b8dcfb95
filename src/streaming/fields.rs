//! Field lookup over heterogeneous provider payloads.
//!
//! Providers spell the same concept differently (`reasoning_content`,
//! `thinking`, `reasoning.text`, ...). Each concept is described by an ordered
//! list of dot-separated candidate paths; the first candidate that resolves to
//! a usable value wins. Numeric segments index into arrays.

use serde_json::Value;

use crate::types::{ReasoningKind, Usage};

/// Free-text reasoning fields, most specific first.
pub const REASONING_CONTENT_FIELDS: &[&str] = &[
    "reasoning_content",
    "thinking",
    "reasoning",
    "reasoning.text",
    "reasoning.content",
];

/// Summary-only reasoning fields.
pub const REASONING_SUMMARY_FIELDS: &[&str] =
    &["reasoning_summary", "reasoning.summary", "summary"];

/// Candidate paths for each [`Usage`] field.
#[derive(Debug, Clone, Copy)]
pub struct UsageFields {
    pub prompt: &'static [&'static str],
    pub completion: &'static [&'static str],
    pub total: &'static [&'static str],
    pub reasoning: &'static [&'static str],
    pub cached: &'static [&'static str],
}

pub const OPENAI_USAGE: UsageFields = UsageFields {
    prompt: &["prompt_tokens", "input_tokens"],
    completion: &["completion_tokens", "output_tokens"],
    total: &["total_tokens"],
    reasoning: &[
        "completion_tokens_details.reasoning_tokens",
        "output_tokens_details.reasoning_tokens",
        "reasoning_tokens",
    ],
    cached: &[
        "prompt_tokens_details.cached_tokens",
        "input_tokens_details.cached_tokens",
        "prompt_cache_hit_tokens",
    ],
};

pub const ANTHROPIC_USAGE: UsageFields = UsageFields {
    prompt: &["input_tokens"],
    completion: &["output_tokens"],
    total: &[],
    reasoning: &[],
    cached: &["cache_read_input_tokens"],
};

pub const GEMINI_USAGE: UsageFields = UsageFields {
    prompt: &["promptTokenCount"],
    completion: &["candidatesTokenCount"],
    total: &["totalTokenCount"],
    reasoning: &["thoughtsTokenCount"],
    cached: &["cachedContentTokenCount"],
};

pub const OLLAMA_USAGE: UsageFields = UsageFields {
    prompt: &["prompt_eval_count"],
    completion: &["eval_count"],
    total: &[],
    reasoning: &[],
    cached: &[],
};

/// Resolve a dot-separated path.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// First candidate that resolves to a non-empty string.
pub fn first_str<'a>(value: &'a Value, candidates: &[&str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, path).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

/// First candidate that resolves to a non-negative integer that fits `u32`.
pub fn first_u32(value: &Value, candidates: &[&str]) -> Option<u32> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, path).and_then(Value::as_u64))
        .find_map(|n| u32::try_from(n).ok())
}

/// Reasoning text in `value`, preferring free-text content over summaries.
pub fn probe_reasoning(value: &Value) -> Option<(&str, ReasoningKind)> {
    if let Some(text) = first_str(value, REASONING_CONTENT_FIELDS) {
        return Some((text, ReasoningKind::Content));
    }
    first_str(value, REASONING_SUMMARY_FIELDS).map(|text| (text, ReasoningKind::Summary))
}

/// Build a usage snapshot. Returns `None` when no token count is present.
pub fn usage_from(value: &Value, fields: &UsageFields) -> Option<Usage> {
    let prompt = first_u32(value, fields.prompt);
    let completion = first_u32(value, fields.completion);
    let total = first_u32(value, fields.total);
    if prompt.is_none() && completion.is_none() && total.is_none() {
        return None;
    }
    Some(
        Usage {
            prompt_tokens: prompt.unwrap_or(0),
            completion_tokens: completion.unwrap_or(0),
            total_tokens: total.unwrap_or(0),
            reasoning_tokens: first_u32(value, fields.reasoning),
            cached_tokens: first_u32(value, fields.cached),
        }
        .with_computed_total(),
    )
}
