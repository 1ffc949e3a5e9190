//! HTTP classifier — moderation tier 2.
//!
//! [`HttpClassifier`] delegates the semantic check to an external
//! OpenAI-compatible completion endpoint: one POST per evaluation, bounded
//! timeout, verdict extracted from the first balanced-brace JSON object in
//! the reply.
//!
//! Failure policy is fail-open, never fail-closed: a network error, a
//! non-success status, or unparsable output all yield a non-blocking
//! verdict with a diagnostic reason.  The decision engine records every
//! invocation either way.

use async_trait::async_trait;
use sekisho_core::chat::CompletionResponse;
use sekisho_core::moderation::{ClassifierVerdict, TextClassifier};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

/// Configuration for [`HttpClassifier`].
#[derive(Debug, Clone)]
pub struct HttpClassifierConfig {
    /// Base URL of an OpenAI-compatible endpoint.
    pub base_url: String,
    /// API key.  When `None` the classifier reports itself unavailable and
    /// tier-2 is skipped entirely.
    pub api_key: Option<String>,
    /// Model used for classification.
    pub model: String,
    /// Per-call timeout (seconds).
    pub timeout_secs: u64,
}

impl Default for HttpClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 15,
        }
    }
}

impl HttpClassifierConfig {
    /// Read configuration from `SEKISHO_CLASSIFIER_*` environment variables.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            base_url: std::env::var("SEKISHO_CLASSIFIER_URL").unwrap_or(default.base_url),
            api_key: std::env::var("SEKISHO_CLASSIFIER_API_KEY").ok(),
            model: std::env::var("SEKISHO_CLASSIFIER_MODEL").unwrap_or(default.model),
            timeout_secs: std::env::var("SEKISHO_CLASSIFIER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.timeout_secs),
        }
    }
}

/// Semantic classifier backed by an OpenAI-compatible completion API.
pub struct HttpClassifier {
    config: HttpClassifierConfig,
    client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(config: HttpClassifierConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build reqwest client");

        Self {
            config: HttpClassifierConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            client,
        }
    }

    /// The instruction asks for more than literal matches: euphemisms,
    /// abbreviations, and topic-adjacent references to the listed words
    /// must be flagged too — that is the whole point of tier-2.
    fn build_prompt(text: &str, words: &[String]) -> String {
        let word_list = words
            .iter()
            .map(|w| format!("\"{w}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "You are a content moderation checker. Prohibited words: [{word_list}].\n\
             Judge whether the following text refers to any prohibited word — \
             including euphemisms, abbreviations, or topic-adjacent references, \
             not just literal matches.\n\
             Text to check:\n{text}\n\n\
             Answer with a single JSON object and nothing else: \
             {{\"blocked\": boolean, \"matched_word\": string or null, \"reason\": string}}"
        )
    }
}

#[async_trait]
impl TextClassifier for HttpClassifier {
    fn name(&self) -> &str {
        "http-classifier"
    }

    fn is_available(&self) -> bool {
        !self.config.base_url.is_empty() && self.config.api_key.is_some()
    }

    #[instrument(skip(self, text, words), fields(model = %self.config.model))]
    async fn classify(&self, text: &str, words: &[String]) -> ClassifierVerdict {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let payload = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": Self::build_prompt(text, words)}],
            "temperature": 0,
        });

        let mut builder = self.client.post(&url).json(&payload);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => return ClassifierVerdict::pass(format!("classifier request failed: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            return ClassifierVerdict::pass(format!("classifier returned status {status}"));
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                return ClassifierVerdict::pass(format!("classifier response unreadable: {e}"));
            }
        };

        debug!(bytes = body.len(), "classifier response received");
        parse_verdict(&body)
    }
}

/// Pull the verdict out of a classifier reply.
///
/// The reply is usually a chat completion whose assistant text contains the
/// verdict object, often wrapped in prose or a markdown fence; a
/// non-completion body is scanned directly.
fn parse_verdict(body: &str) -> ClassifierVerdict {
    let haystack = serde_json::from_str::<CompletionResponse>(body)
        .ok()
        .and_then(|completion| completion.content().map(str::to_string))
        .unwrap_or_else(|| body.to_string());

    match first_json_object(&haystack).and_then(|s| serde_json::from_str(s).ok()) {
        Some(verdict) => verdict,
        None => ClassifierVerdict::pass("classifier output contained no parsable verdict"),
    }
}

/// First brace-delimited, brace-balanced substring of `text`.
/// String literals are honored so braces inside quoted values don't
/// unbalance the scan.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_object_embedded_in_prose() {
        let text = "Sure! Here is my verdict:\n{\"blocked\": true, \"matched_word\": \"暴力\", \"reason\": \"ok\"}\nHope that helps.";
        let obj = first_json_object(text).unwrap();
        let verdict: ClassifierVerdict = serde_json::from_str(obj).unwrap();
        assert!(verdict.blocked);
        assert_eq!(verdict.matched_word.as_deref(), Some("暴力"));
    }

    #[test]
    fn braces_inside_strings_do_not_unbalance() {
        let text = r#"{"reason": "contains } and { chars", "blocked": false}"#;
        assert_eq!(first_json_object(text), Some(text));
    }

    #[test]
    fn nested_objects_are_kept_whole() {
        let text = r#"prefix {"a": {"b": 1}} suffix"#;
        assert_eq!(first_json_object(text), Some(r#"{"a": {"b": 1}}"#));
    }

    #[test]
    fn no_object_returns_none() {
        assert_eq!(first_json_object("no braces here"), None);
        assert_eq!(first_json_object("{unterminated"), None);
    }

    #[test]
    fn completion_shaped_reply_is_unwrapped_first() {
        let body = r#"{
            "id": "chatcmpl-1", "object": "chat.completion", "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "```json\n{\"blocked\": true, \"matched_word\": \"bomb\", \"reason\": \"abbreviation\"}\n```"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        }"#;
        let verdict = parse_verdict(body);
        assert!(verdict.blocked);
        assert_eq!(verdict.matched_word.as_deref(), Some("bomb"));
    }

    #[test]
    fn garbage_reply_fails_open() {
        let verdict = parse_verdict("I refuse to answer in JSON");
        assert!(!verdict.blocked);
        assert!(!verdict.reason.is_empty());
    }

    #[test]
    fn missing_api_key_means_unavailable() {
        let classifier = HttpClassifier::new(HttpClassifierConfig::default());
        assert!(!classifier.is_available());

        let classifier = HttpClassifier::new(HttpClassifierConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        });
        assert!(classifier.is_available());
    }

    #[test]
    fn prompt_embeds_text_and_word_list() {
        let prompt =
            HttpClassifier::build_prompt("check this", &["暴力".to_string(), "bomb".to_string()]);
        assert!(prompt.contains("check this"));
        assert!(prompt.contains("\"暴力\", \"bomb\""));
        assert!(prompt.contains("euphemisms"));
    }
}
