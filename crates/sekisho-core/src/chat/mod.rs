//! Chat-completion wire protocol subset.
//!
//! Sekisho does not reimplement the upstream API — it only needs to *read*
//! the fields that matter for moderation (`model`, `stream`, `messages`,
//! `prompt`) and to *write* responses that are byte-compatible with a
//! normal completion.  Everything else in a request body is passed through
//! untouched, which keeps the proxy forward-compatible with new model
//! parameters.

pub mod extract;
pub mod types;

pub use extract::checkable_text;
pub use types::{
    ChatMessage, Choice, ChunkChoice, ChunkDelta, CompletionChunk, CompletionRequest,
    CompletionResponse, ContentPart, MessageContent, Usage,
};
