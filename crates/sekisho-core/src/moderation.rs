//! Moderation contract types and the classifier port.
//!
//! The decision pipeline has two tiers with strict precedence:
//! tier-1 is a deterministic keyword match, tier-2 is an optional semantic
//! classifier reached through the [`TextClassifier`] trait.  The trait is
//! the seam that keeps the concrete classifier backend swappable without
//! touching the decision logic or the interceptor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Decision outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Which tier produced a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSource {
    Keyword,
    Classifier,
}

impl std::fmt::Display for BlockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockSource::Keyword => write!(f, "keyword"),
            BlockSource::Classifier => write!(f, "classifier"),
        }
    }
}

/// The unified outcome of the moderation pipeline for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationResult {
    /// Nothing matched — forward to the upstream.
    Clean,
    /// A tier matched — synthesize a refusal, never contact the upstream.
    Blocked {
        /// The matched term, in the casing stored in the policy set.
        term: String,
        source: BlockSource,
        /// Free-text rationale.  Empty for keyword blocks; carries the
        /// classifier's explanation for tier-2 blocks.
        reason: String,
    },
}

impl ModerationResult {
    pub fn is_blocked(&self) -> bool {
        matches!(self, ModerationResult::Blocked { .. })
    }

    /// Audit annotation, e.g. `keyword:暴力`.
    pub fn annotation(&self) -> Option<String> {
        match self {
            ModerationResult::Clean => None,
            ModerationResult::Blocked { term, source, .. } => Some(format!("{source}:{term}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Classifier port
// ─────────────────────────────────────────────────────────────────────────────

/// The typed verdict returned by a semantic classifier.
///
/// This is an audit artifact, never policy state: it is recorded once per
/// invocation and then discarded.  All fields default so that a partial
/// JSON object from a sloppy classifier still parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub matched_word: Option<String>,
    #[serde(default)]
    pub reason: String,
}

impl ClassifierVerdict {
    /// A non-blocking verdict with a diagnostic reason.  Every classifier
    /// failure path collapses to this — the pipeline fails open.
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            blocked: false,
            matched_word: None,
            reason: reason.into(),
        }
    }

    pub fn block(matched_word: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            blocked: true,
            matched_word: Some(matched_word.into()),
            reason: reason.into(),
        }
    }
}

/// Port to an external semantic text classifier.
///
/// `classify` is infallible by signature: implementations must map network
/// errors, non-success statuses, and unparsable output to
/// [`ClassifierVerdict::pass`] with a diagnostic reason.  Blocking on a
/// broken classifier would turn an availability incident into a policy
/// decision.
#[async_trait]
pub trait TextClassifier: Send + Sync {
    /// Stable identifier used in logs and audit entries.
    fn name(&self) -> &str;

    /// Whether the classifier has the credentials/configuration it needs.
    /// When `false` the decision pipeline skips tier-2 entirely.
    fn is_available(&self) -> bool;

    /// Evaluate `text` against the given policy words.
    async fn classify(&self, text: &str, words: &[String]) -> ClassifierVerdict;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_names_source_and_term() {
        let blocked = ModerationResult::Blocked {
            term: "暴力".to_string(),
            source: BlockSource::Keyword,
            reason: String::new(),
        };
        assert_eq!(blocked.annotation().as_deref(), Some("keyword:暴力"));
        assert_eq!(ModerationResult::Clean.annotation(), None);
    }

    #[test]
    fn partial_verdict_json_parses_with_defaults() {
        let v: ClassifierVerdict = serde_json::from_str(r#"{"blocked": true}"#).unwrap();
        assert!(v.blocked);
        assert_eq!(v.matched_word, None);
        assert_eq!(v.reason, "");
    }

    #[test]
    fn empty_object_is_a_pass() {
        let v: ClassifierVerdict = serde_json::from_str("{}").unwrap();
        assert!(!v.blocked);
    }
}
