//! Moderation decision engine.
//!
//! Owns the in-memory policy-word cache and combines the two moderation
//! tiers into one [`ModerationResult`] with strict precedence: the keyword
//! tier always wins and always short-circuits the classifier tier.
//!
//! The cache is replaced wholesale on [`reload`](ModerationEngine::reload)
//! — readers take an `Arc` snapshot and never observe a partially-updated
//! set.

use crate::moderation::matcher;
use parking_lot::RwLock;
use sekisho_core::moderation::{BlockSource, ModerationResult, TextClassifier};
use sekisho_store::{
    ClassifierCallLog, ClassifierLogStore, ModerationStore, PersistenceResult, PolicyWord,
    PolicyWordStore,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Two-tier moderation decision engine.
pub struct ModerationEngine {
    /// Point-in-time snapshots: readers clone the inner `Arc`, reload swaps
    /// it.  The lock is held only for the pointer copy.
    policy: RwLock<Arc<Vec<PolicyWord>>>,
    classifier: Option<Arc<dyn TextClassifier>>,
    store: Arc<dyn ModerationStore>,
}

impl ModerationEngine {
    pub fn new(
        store: Arc<dyn ModerationStore>,
        classifier: Option<Arc<dyn TextClassifier>>,
    ) -> Self {
        Self {
            policy: RwLock::new(Arc::new(Vec::new())),
            classifier,
            store,
        }
    }

    /// Fetch the word list from the store and atomically replace the cache.
    /// Returns the new word count.
    pub async fn reload(&self) -> PersistenceResult<usize> {
        let words = self.store.list_words().await?;
        let count = words.len();
        *self.policy.write() = Arc::new(words);
        info!(word_count = count, "policy word cache reloaded");
        Ok(count)
    }

    /// Current cache snapshot.  The returned `Arc` stays valid across
    /// concurrent reloads.
    pub fn snapshot(&self) -> Arc<Vec<PolicyWord>> {
        self.policy.read().clone()
    }

    /// Evaluate `text` against both tiers.
    pub async fn decide(&self, text: &str) -> ModerationResult {
        let words = self.snapshot();

        if let Some(hit) = matcher::find_match(text, &words) {
            debug!(term = %hit.word, "keyword tier matched");
            return ModerationResult::Blocked {
                term: hit.word.clone(),
                source: BlockSource::Keyword,
                reason: String::new(),
            };
        }

        let Some(classifier) = &self.classifier else {
            return ModerationResult::Clean;
        };
        if !classifier.is_available() || words.is_empty() {
            return ModerationResult::Clean;
        }

        let word_texts: Vec<String> = words.iter().map(|w| w.word.clone()).collect();
        let started = Instant::now();
        let verdict = classifier.classify(text, &word_texts).await;
        let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        // Every invocation is logged, block or not — this is an activity
        // audit, not a block log.  A persistence failure must not change
        // the decision.
        let entry = ClassifierCallLog::new(
            classifier.name(),
            text,
            word_texts,
            verdict.blocked,
            verdict.matched_word.clone(),
            verdict.reason.clone(),
            latency_ms,
        );
        if let Err(e) = self.store.record_call(&entry).await {
            warn!(error = %e, "failed to persist classifier audit entry");
        }

        if verdict.blocked {
            ModerationResult::Blocked {
                term: verdict
                    .matched_word
                    .unwrap_or_else(|| "policy".to_string()),
                source: BlockSource::Classifier,
                reason: verdict.reason,
            }
        } else {
            ModerationResult::Clean
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sekisho_core::moderation::ClassifierVerdict;
    use sekisho_store::{InMemoryStore, PolicyWordStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Classifier double that records how often it was invoked.
    struct ScriptedClassifier {
        verdict: ClassifierVerdict,
        available: bool,
        calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        fn new(verdict: ClassifierVerdict) -> Self {
            Self {
                verdict,
                available: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TextClassifier for ScriptedClassifier {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn classify(&self, _text: &str, _words: &[String]) -> ClassifierVerdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict.clone()
        }
    }

    async fn store_with_words(words: &[&str]) -> Arc<InMemoryStore> {
        let store = InMemoryStore::shared();
        for w in words {
            store.add_word(&PolicyWord::new(*w)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn keyword_hit_blocks_without_calling_classifier() {
        let store = store_with_words(&["暴力"]).await;
        let classifier = Arc::new(ScriptedClassifier::new(ClassifierVerdict::block(
            "x", "should never run",
        )));
        let engine = ModerationEngine::new(store.clone(), Some(classifier.clone()));
        engine.reload().await.unwrap();

        let result = engine.decide("これは暴力的な話です").await;
        match result {
            ModerationResult::Blocked { term, source, .. } => {
                assert_eq!(term, "暴力");
                assert_eq!(source, BlockSource::Keyword);
            }
            other => panic!("expected block, got {other:?}"),
        }
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.classifier_call_count().await, 0);
    }

    #[tokio::test]
    async fn classifier_block_carries_reason() {
        let store = store_with_words(&["暴力"]).await;
        let classifier = Arc::new(ScriptedClassifier::new(ClassifierVerdict::block(
            "暴力",
            "euphemistic reference",
        )));
        let engine = ModerationEngine::new(store.clone(), Some(classifier));
        engine.reload().await.unwrap();

        let result = engine.decide("topic-adjacent phrasing").await;
        match result {
            ModerationResult::Blocked {
                term,
                source,
                reason,
            } => {
                assert_eq!(term, "暴力");
                assert_eq!(source, BlockSource::Classifier);
                assert_eq!(reason, "euphemistic reference");
            }
            other => panic!("expected block, got {other:?}"),
        }
        // Exactly one activity log entry.
        assert_eq!(store.classifier_call_count().await, 1);
    }

    #[tokio::test]
    async fn failed_classifier_fails_open_and_still_logs() {
        let store = store_with_words(&["暴力"]).await;
        let classifier = Arc::new(ScriptedClassifier::new(ClassifierVerdict::pass(
            "classifier request failed: connection refused",
        )));
        let engine = ModerationEngine::new(store.clone(), Some(classifier));
        engine.reload().await.unwrap();

        assert_eq!(engine.decide("こんにちは").await, ModerationResult::Clean);
        assert_eq!(store.classifier_call_count().await, 1);
    }

    #[tokio::test]
    async fn unavailable_classifier_is_skipped() {
        let store = store_with_words(&["暴力"]).await;
        let mut classifier = ScriptedClassifier::new(ClassifierVerdict::block("x", ""));
        classifier.available = false;
        let classifier = Arc::new(classifier);
        let engine = ModerationEngine::new(store.clone(), Some(classifier.clone()));
        engine.reload().await.unwrap();

        assert_eq!(engine.decide("anything").await, ModerationResult::Clean);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reload_swaps_snapshot_atomically() {
        let store = store_with_words(&["old"]).await;
        let engine = ModerationEngine::new(store.clone(), None);
        engine.reload().await.unwrap();

        let before = engine.snapshot();
        store.add_word(&PolicyWord::new("new")).await.unwrap();
        engine.reload().await.unwrap();

        // The pre-reload snapshot is unchanged; the new one sees both words.
        assert_eq!(before.len(), 1);
        assert_eq!(engine.snapshot().len(), 2);
    }
}
