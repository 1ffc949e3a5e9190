//! Serde types for the inspected and synthesized parts of the
//! chat-completion wire protocol.
//!
//! Deserialization is deliberately tolerant: unknown fields are ignored,
//! unknown content-part types collapse into [`ContentPart::Unsupported`],
//! and content shapes that match neither a string nor a part list land in
//! [`MessageContent::Unrecognized`].  The moderation pipeline maps every
//! "didn't understand this" branch to *skip moderation and forward*, never
//! to an error.
//!
//! Serialization is deliberately exact: field order, `null` placement, and
//! optional-field omission follow what an OpenAI-compatible backend emits,
//! because synthesized refusals must be indistinguishable from real
//! completions on the wire.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Inbound request
// ─────────────────────────────────────────────────────────────────────────────

/// The subset of a chat-completion request body the proxy inspects.
///
/// All fields are optional so that arbitrary (non-chat) JSON bodies parse
/// into an all-`None` value instead of failing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionRequest {
    /// Model name, echoed back verbatim in synthesized responses.
    pub model: Option<String>,
    /// When `true` the caller expects an SSE stream.
    pub stream: Option<bool>,
    /// Conversation turns (modern chat shape).
    pub messages: Option<Vec<ChatMessage>>,
    /// Legacy single-prompt shape.
    pub prompt: Option<String>,
}

/// A single conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role is kept as a plain string so unknown roles (`developer`,
    /// `function`, …) don't fail the whole-body parse.
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
}

impl ChatMessage {
    /// Construct an assistant turn with plain-text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(MessageContent::Text(content.into())),
        }
    }
}

/// Message content is polymorphic on the wire: a plain string, a list of
/// typed parts, or something this proxy does not recognize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// `"content": "hello"`
    Text(String),
    /// `"content": [{"type": "text", "text": "hello"}, …]`
    Parts(Vec<ContentPart>),
    /// Anything else — mapped to the skip-moderation path.
    Unrecognized(serde_json::Value),
}

impl MessageContent {
    /// Plain-text view of the content, if it has one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A typed content part.  Only `text` parts carry checkable content; every
/// other part type (`image_url`, `input_audio`, …) is preserved on the
/// forwarded body but invisible to moderation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion response
// ─────────────────────────────────────────────────────────────────────────────

/// A non-streaming chat-completion result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    /// Always `"chat.completion"`.
    pub object: String,
    /// Unix timestamp (seconds).
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Text content of the first choice, if present.
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_ref()?.as_text()
    }
}

/// A single completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    /// Always serialized — a real backend emits `"finish_reason": "stop"`,
    /// never omits the field.
    pub finish_reason: Option<String>,
}

/// Token usage counters.  All zero on synthesized responses: no tokens
/// were consumed because no model ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming chunks
// ─────────────────────────────────────────────────────────────────────────────

/// One streamed completion chunk (`object: "chat.completion.chunk"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// A streamed choice.  `finish_reason` is always serialized so the first
/// chunk carries an explicit `"finish_reason": null`, matching upstream
/// framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

/// Incremental content.  Empty deltas serialize as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arbitrary_json_parses_to_empty_request() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"input": "not a chat body", "n": 3}"#).unwrap();
        assert!(req.model.is_none());
        assert!(req.messages.is_none());
        assert!(req.prompt.is_none());
    }

    #[test]
    fn string_content_parses_as_text() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role": "user", "content": "hello"}"#).unwrap();
        assert_eq!(msg.content.unwrap().as_text(), Some("hello"));
    }

    #[test]
    fn part_list_parses_with_unsupported_collapsed() {
        let msg: ChatMessage = serde_json::from_str(
            r#"{"role": "user", "content": [
                {"type": "text", "text": "a"},
                {"type": "image_url", "image_url": {"url": "http://x/y.png"}},
                {"type": "text", "text": "b"}
            ]}"#,
        )
        .unwrap();
        match msg.content.unwrap() {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[1], ContentPart::Unsupported));
            }
            other => panic!("expected Parts, got {other:?}"),
        }
    }

    #[test]
    fn object_content_lands_in_unrecognized() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role": "user", "content": {"weird": true}}"#).unwrap();
        assert!(matches!(
            msg.content.unwrap(),
            MessageContent::Unrecognized(_)
        ));
    }

    #[test]
    fn empty_delta_serializes_as_empty_object() {
        let delta = ChunkDelta::default();
        assert_eq!(serde_json::to_string(&delta).unwrap(), "{}");
    }

    #[test]
    fn chunk_choice_serializes_explicit_null_finish_reason() {
        let choice = ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            finish_reason: None,
        };
        let json = serde_json::to_string(&choice).unwrap();
        assert!(json.contains(r#""finish_reason":null"#));
    }
}
