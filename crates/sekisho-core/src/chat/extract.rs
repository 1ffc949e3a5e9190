//! Content extraction — normalizes heterogeneous request payload shapes
//! into a single plain-text string for the moderation tiers.
//!
//! Extraction is a pure function of the request body.  A `None` return
//! means "nothing to check": the pipeline forwards the request without
//! moderation.  Ambiguity is never an error.

use super::types::{CompletionRequest, ContentPart, MessageContent};

/// Extract the text to moderate from a raw JSON request body.
///
/// Returns `None` when the body is not JSON, is not chat-shaped, or
/// contains no user-authored text.
pub fn checkable_text(body: &[u8]) -> Option<String> {
    let req: CompletionRequest = serde_json::from_slice(body).ok()?;
    from_request(&req)
}

/// Extract the text to moderate from an already-parsed request.
///
/// Only the *last* user turn is examined — earlier user turns were already
/// moderated when they were first submitted, and re-blocking a turn the
/// caller has already had answered would wedge the whole conversation.
pub fn from_request(req: &CompletionRequest) -> Option<String> {
    if let Some(messages) = &req.messages {
        let last_user = messages.iter().rev().find(|m| m.role == "user")?;
        return match last_user.content.as_ref()? {
            MessageContent::Text(text) => Some(text.clone()),
            MessageContent::Parts(parts) => {
                let joined = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        ContentPart::Unsupported => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                (!joined.is_empty()).then_some(joined)
            }
            MessageContent::Unrecognized(_) => None,
        };
    }

    req.prompt.clone().filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Option<String> {
        checkable_text(body.as_bytes())
    }

    #[test]
    fn plain_string_content() {
        let text = parse(r#"{"messages": [{"role": "user", "content": "これは暴力的な話です"}]}"#);
        assert_eq!(text.as_deref(), Some("これは暴力的な話です"));
    }

    #[test]
    fn only_last_user_turn_is_checked() {
        let text = parse(
            r#"{"messages": [
                {"role": "user", "content": "first turn"},
                {"role": "assistant", "content": "reply"},
                {"role": "user", "content": "second turn"}
            ]}"#,
        );
        assert_eq!(text.as_deref(), Some("second turn"));
    }

    #[test]
    fn assistant_only_conversation_has_nothing_to_check() {
        assert_eq!(
            parse(r#"{"messages": [{"role": "assistant", "content": "hi"}]}"#),
            None
        );
    }

    #[test]
    fn multimodal_parts_join_text_with_single_space() {
        let text = parse(
            r#"{"messages": [{"role": "user", "content": [
                {"type": "text", "text": "a"},
                {"type": "image", "image_url": {"url": "http://x"}},
                {"type": "text", "text": "b"}
            ]}]}"#,
        );
        assert_eq!(text.as_deref(), Some("a b"));
    }

    #[test]
    fn image_only_parts_have_nothing_to_check() {
        let text = parse(
            r#"{"messages": [{"role": "user", "content": [
                {"type": "image_url", "image_url": {"url": "http://x"}}
            ]}]}"#,
        );
        assert_eq!(text, None);
    }

    #[test]
    fn legacy_prompt_is_used_directly() {
        assert_eq!(
            parse(r#"{"prompt": "complete this"}"#).as_deref(),
            Some("complete this")
        );
    }

    #[test]
    fn messages_take_precedence_over_prompt() {
        // An empty user-less messages list short-circuits even when a
        // legacy prompt is also present.
        let text = parse(r#"{"messages": [], "prompt": "fallback"}"#);
        assert_eq!(text, None);
    }

    #[test]
    fn non_json_body_has_nothing_to_check() {
        assert_eq!(checkable_text(b"not json at all"), None);
    }

    #[test]
    fn non_chat_json_has_nothing_to_check() {
        assert_eq!(parse(r#"{"input": "embedding text"}"#), None);
    }
}
