//! Streaming chunk types.
//!
//! A stream is a lazy, finite sequence of [`Chunk`]s terminated by exactly one
//! chunk whose `done` flag is set.

use serde::{Deserialize, Serialize};

use super::common::{FinishReason, Usage};

/// Discriminant of a [`Chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Content,
    Reasoning,
    ToolCallDelta,
    Usage,
    Done,
}

/// Incremental fragment of one tool invocation.
///
/// Deltas of the same logical call share a non-empty `id`, or the same `index`
/// when the provider withholds the id until the final delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position in the model's tool-call array.
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    /// Text appended to the call's accumulated arguments.
    #[serde(default)]
    pub arguments_delta: String,
}

impl ToolCallDelta {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.id = (!id.is_empty()).then_some(id);
        self
    }

    pub fn with_type(mut self, call_type: impl Into<String>) -> Self {
        self.call_type = Some(call_type.into());
        self
    }

    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments_delta = arguments.into();
        self
    }

    /// The non-empty id, if any.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|s| !s.is_empty())
    }
}

/// Which reasoning channel a delta belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningKind {
    /// Free-text reasoning content.
    Content,
    /// Summary-only reasoning text.
    Summary,
}

/// Canonical reasoning delta, whatever the provider's field spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningDelta {
    pub text: String,
    pub channel: ReasoningKind,
}

/// Payload of a [`Chunk`], specific to its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkPayload {
    Content { delta: String },
    Reasoning(ReasoningDelta),
    ToolCallDelta(ToolCallDelta),
    Usage(Usage),
    /// Completion marker. Carries the full usage on the terminal chunk.
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

/// The atomic unit produced while streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(flatten)]
    pub payload: ChunkPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    pub done: bool,
}

impl Chunk {
    fn of(payload: ChunkPayload) -> Self {
        Self {
            payload,
            finish_reason: None,
            done: false,
        }
    }

    pub fn content(delta: impl Into<String>) -> Self {
        Self::of(ChunkPayload::Content {
            delta: delta.into(),
        })
    }

    pub fn reasoning(text: impl Into<String>, channel: ReasoningKind) -> Self {
        Self::of(ChunkPayload::Reasoning(ReasoningDelta {
            text: text.into(),
            channel,
        }))
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self::of(ChunkPayload::ToolCallDelta(delta))
    }

    pub fn usage(usage: Usage) -> Self {
        Self::of(ChunkPayload::Usage(usage))
    }

    /// Non-terminal completion marker: generation finished, but trailing
    /// metadata (usage, the end sentinel) may still follow.
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            payload: ChunkPayload::Done { usage: None },
            finish_reason: Some(reason),
            done: false,
        }
    }

    /// The chunk that terminates a stream.
    pub fn terminal(usage: Option<Usage>, finish_reason: Option<FinishReason>) -> Self {
        Self {
            payload: ChunkPayload::Done { usage },
            finish_reason,
            done: true,
        }
    }

    pub fn kind(&self) -> ChunkKind {
        match &self.payload {
            ChunkPayload::Content { .. } => ChunkKind::Content,
            ChunkPayload::Reasoning(_) => ChunkKind::Reasoning,
            ChunkPayload::ToolCallDelta(_) => ChunkKind::ToolCallDelta,
            ChunkPayload::Usage(_) => ChunkKind::Usage,
            ChunkPayload::Done { .. } => ChunkKind::Done,
        }
    }

    /// Content text, for content chunks.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            ChunkPayload::Content { delta } => Some(delta),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_chunk_is_done_kind() {
        let chunk = Chunk::terminal(Some(Usage::new(1, 2)), Some(FinishReason::Stop));
        assert_eq!(chunk.kind(), ChunkKind::Done);
        assert!(chunk.is_terminal());

        let marker = Chunk::finish(FinishReason::Length);
        assert_eq!(marker.kind(), ChunkKind::Done);
        assert!(!marker.is_terminal());
    }

    #[test]
    fn empty_tool_call_id_is_treated_as_absent() {
        let delta = ToolCallDelta::new(0).with_id("");
        assert_eq!(delta.id(), None);
        let delta = ToolCallDelta::new(0).with_id("call_1");
        assert_eq!(delta.id(), Some("call_1"));
    }

    #[test]
    fn chunk_serializes_with_kind_tag() {
        let json = serde_json::to_value(Chunk::content("hi")).unwrap();
        assert_eq!(json["kind"], "content");
        assert_eq!(json["delta"], "hi");
        assert_eq!(json["done"], false);
    }
}
