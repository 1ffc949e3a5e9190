//! Response synthesizer.
//!
//! Fabricates a reply that is byte-compatible with what the real upstream
//! would emit for a normal completion, so blocked callers see an ordinary
//! (if unhelpful) answer instead of an API error.  Framing here is a wire
//! contract, not cosmetics: client SDKs parse these bodies, and a missing
//! `[DONE]` sentinel or a mis-named field breaks them.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use sekisho_core::chat::{
    ChatMessage, Choice, ChunkChoice, ChunkDelta, CompletionChunk, CompletionResponse, Usage,
};
use uuid::Uuid;

/// Model name echoed when the request didn't declare one.
const FALLBACK_MODEL: &str = "unknown";

/// A fabricated refusal, ready to return to the caller.
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub body: String,
    pub streaming: bool,
}

impl IntoResponse for Synthesized {
    fn into_response(self) -> Response {
        if self.streaming {
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/event-stream"),
                    (header::CACHE_CONTROL, "no-cache"),
                    (header::CONNECTION, "keep-alive"),
                ],
                self.body,
            )
                .into_response()
        } else {
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                self.body,
            )
                .into_response()
        }
    }
}

/// The human-readable refusal text, naming the matched term and, when the
/// classifier supplied one, its reason.
pub fn refusal_message(term: &str, reason: &str) -> String {
    let mut message = format!(
        "I can't help with that. This request was blocked by the content policy \
         (matched term: \"{term}\")."
    );
    if !reason.is_empty() {
        message.push_str(" Reason: ");
        message.push_str(reason);
    }
    message
}

/// Build the refusal in the form the caller asked for.
pub fn synthesize(term: &str, reason: &str, model: Option<&str>, stream: bool) -> Synthesized {
    let message = refusal_message(term, reason);
    let model = model.unwrap_or(FALLBACK_MODEL);
    let body = if stream {
        streaming_body(model, &message)
    } else {
        completion_body(model, &message)
    };
    Synthesized {
        body,
        streaming: stream,
    }
}

/// One `chat.completion` object with a terminal finish reason and a
/// zero-valued usage block — no tokens were consumed, no model ran.
fn completion_body(model: &str, message: &str) -> String {
    let response = CompletionResponse {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: created_now(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage::assistant(message),
            finish_reason: Some("stop".to_string()),
        }],
        usage: Some(Usage::default()),
    };
    serde_json::to_string(&response).expect("completion serialization cannot fail")
}

/// Two `chat.completion.chunk` frames — role + full refusal text, then an
/// empty delta with `finish_reason: "stop"` — followed by the `[DONE]`
/// sentinel.  Both chunks share one id and timestamp, as upstream chunks
/// from a single completion do.
fn streaming_body(model: &str, message: &str) -> String {
    let id = completion_id();
    let created = created_now();

    let first = CompletionChunk {
        id: id.clone(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: Some("assistant".to_string()),
                content: Some(message.to_string()),
            },
            finish_reason: None,
        }],
    };

    let last = CompletionChunk {
        id,
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            finish_reason: Some("stop".to_string()),
        }],
    };

    format!("{}{}data: [DONE]\n\n", sse_frame(&first), sse_frame(&last))
}

fn sse_frame(chunk: &CompletionChunk) -> String {
    let json = serde_json::to_string(chunk).expect("chunk serialization cannot fail");
    format!("data: {json}\n\n")
}

fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

fn created_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}
