//! Persistence entity definitions.
//!
//! Entity types corresponding to the datastore's table structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest content excerpt kept in a classifier call log entry.
pub const CLASSIFIER_EXCERPT_CHARS: usize = 500;

// ─────────────────────────────────────────────────────────────────────────────
// Audit trail
// ─────────────────────────────────────────────────────────────────────────────

/// One durable record per inbound request.
///
/// `id` is the correlation id: assigned when the interceptor first sees the
/// request, immutable afterwards, and used to tie the completion update
/// back to this row.  The outcome fields stay empty until completion and
/// are written exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub request_headers: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,

    // ── Outcome fields, empty until completion ──────────────────────────────
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Block annotation, e.g. `keyword:暴力`.  `None` for forwarded requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
}

impl AuditRecord {
    /// Create the intercept-time record.  Outcome fields start empty.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        query: Option<String>,
        request_headers: serde_json::Value,
        request_body: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            method: method.into(),
            path: path.into(),
            query,
            request_headers,
            request_body,
            status: None,
            response_headers: None,
            response_body: None,
            duration_ms: None,
            error: None,
            block: None,
        }
    }

    /// Whether the completion update has been applied.
    pub fn is_completed(&self) -> bool {
        self.status.is_some() || self.error.is_some()
    }
}

/// The partial update applied to an [`AuditRecord`] at completion.
///
/// Invariant: `status` and `error` are never both `None` — every terminal
/// state has either an HTTP outcome or a failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditOutcome {
    pub status: Option<u16>,
    pub response_headers: Option<serde_json::Value>,
    pub response_body: Option<String>,
    pub duration_ms: i64,
    pub error: Option<String>,
    pub block: Option<String>,
}

impl AuditOutcome {
    /// Outcome for a completed upstream round-trip.
    pub fn completed(
        status: u16,
        response_headers: serde_json::Value,
        response_body: Option<String>,
        duration_ms: i64,
    ) -> Self {
        Self {
            status: Some(status),
            response_headers: Some(response_headers),
            response_body,
            duration_ms,
            error: None,
            block: None,
        }
    }

    /// Outcome for a synthesized refusal: recorded as a normal 200
    /// completion, annotated with the matched term and tier.
    pub fn blocked(response_body: String, annotation: String, duration_ms: i64) -> Self {
        Self {
            status: Some(200),
            response_headers: None,
            response_body: Some(response_body),
            duration_ms,
            error: None,
            block: Some(annotation),
        }
    }

    /// Outcome for a transport failure while forwarding.
    pub fn failed(error: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            status: None,
            response_headers: None,
            response_body: None,
            duration_ms,
            error: Some(error.into()),
            block: None,
        }
    }

    /// Attach the error text to an otherwise-populated outcome (used for
    /// partial captures on client disconnect).
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy words
// ─────────────────────────────────────────────────────────────────────────────

/// A single prohibited term.  Matching is case-insensitive; the stored
/// casing is what gets reported back in block results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyWord {
    pub id: Uuid,
    pub word: String,
    pub created_at: DateTime<Utc>,
}

impl PolicyWord {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            word: word.into(),
            created_at: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Classifier activity log
// ─────────────────────────────────────────────────────────────────────────────

/// Append-only record of one classifier invocation.
///
/// Written for every call — success, failure, block or pass — because this
/// is a moderation-activity log, not a block log.  Never read back by the
/// pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierCallLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Classifier implementation name (e.g. `http-classifier`).
    pub classifier: String,
    /// Truncated copy of the checked content.
    pub content_excerpt: String,
    /// The word list that was checked.
    pub words: Vec<String>,
    pub blocked: bool,
    pub matched_word: Option<String>,
    pub reason: String,
    pub latency_ms: i64,
}

impl ClassifierCallLog {
    pub fn new(
        classifier: impl Into<String>,
        content: &str,
        words: Vec<String>,
        blocked: bool,
        matched_word: Option<String>,
        reason: impl Into<String>,
        latency_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            classifier: classifier.into(),
            content_excerpt: excerpt(content),
            words,
            blocked,
            matched_word,
            reason: reason.into(),
            latency_ms,
        }
    }
}

/// Char-boundary-safe truncation for log excerpts.
fn excerpt(text: &str) -> String {
    text.chars().take(CLASSIFIER_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_empty_outcome() {
        let record = AuditRecord::new(
            "POST",
            "/v1/chat/completions",
            None,
            serde_json::json!({}),
            None,
        );
        assert!(!record.is_completed());
        assert!(record.status.is_none());
        assert!(record.error.is_none());
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let long = "暴".repeat(CLASSIFIER_EXCERPT_CHARS * 2);
        let log = ClassifierCallLog::new("test", &long, vec![], false, None, "", 0);
        assert_eq!(log.content_excerpt.chars().count(), CLASSIFIER_EXCERPT_CHARS);
    }

    #[test]
    fn outcome_constructors_keep_the_invariant() {
        assert!(AuditOutcome::completed(200, serde_json::json!({}), None, 5).status.is_some());
        assert!(AuditOutcome::failed("refused", 5).error.is_some());
        let blocked = AuditOutcome::blocked("{}".into(), "keyword:x".into(), 1);
        assert_eq!(blocked.status, Some(200));
        assert_eq!(blocked.block.as_deref(), Some("keyword:x"));
    }
}
