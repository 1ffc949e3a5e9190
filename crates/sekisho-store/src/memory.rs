//! In-memory storage backend.
//!
//! Thread-safe, no durability.  Suitable for unit tests, development, and
//! throwaway runs; production deployments use the SQLite backend.

use super::entities::*;
use super::traits::*;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory store.
///
/// Audit records keep a side vector of ids in insertion order so pagination
/// is stable; policy words live in a plain `Vec` because their stored
/// order *is* the matcher's precedence order.
pub struct InMemoryStore {
    records: Arc<RwLock<HashMap<Uuid, AuditRecord>>>,
    record_order: Arc<RwLock<Vec<Uuid>>>,
    words: Arc<RwLock<Vec<PolicyWord>>>,
    classifier_calls: Arc<RwLock<Vec<ClassifierCallLog>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            record_order: Arc::new(RwLock::new(Vec::new())),
            words: Arc::new(RwLock::new(Vec::new())),
            classifier_calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Drop all data.
    pub async fn clear(&self) {
        self.records.write().await.clear();
        self.record_order.write().await.clear();
        self.words.write().await.clear();
        self.classifier_calls.write().await.clear();
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn classifier_call_count(&self) -> usize {
        self.classifier_calls.read().await.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryStore {
    async fn insert(&self, record: &AuditRecord) -> PersistenceResult<Uuid> {
        let mut records = self.records.write().await;
        records.insert(record.id, record.clone());
        self.record_order.write().await.push(record.id);
        Ok(record.id)
    }

    async fn update_outcome(&self, id: Uuid, outcome: &AuditOutcome) -> PersistenceResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;
        record.status = outcome.status;
        record.response_headers = outcome.response_headers.clone();
        record.response_body = outcome.response_body.clone();
        record.duration_ms = Some(outcome.duration_ms);
        record.error = outcome.error.clone();
        record.block = outcome.block.clone();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> PersistenceResult<Option<AuditRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list_page(
        &self,
        limit: i64,
        offset: i64,
    ) -> PersistenceResult<(Vec<AuditRecord>, i64)> {
        let records = self.records.read().await;
        let order = self.record_order.read().await;
        let total = order.len() as i64;
        let page = order
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|id| records.get(id).cloned())
            .collect();
        Ok((page, total))
    }

    async fn prune_older_than(&self, days: i64) -> PersistenceResult<i64> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut records = self.records.write().await;
        let mut order = self.record_order.write().await;
        let before = records.len();
        records.retain(|_, r| r.timestamp >= cutoff);
        order.retain(|id| records.contains_key(id));
        Ok((before - records.len()) as i64)
    }
}

#[async_trait]
impl PolicyWordStore for InMemoryStore {
    async fn list_words(&self) -> PersistenceResult<Vec<PolicyWord>> {
        Ok(self.words.read().await.clone())
    }

    async fn add_word(&self, word: &PolicyWord) -> PersistenceResult<()> {
        self.words.write().await.push(word.clone());
        Ok(())
    }

    async fn update_word(&self, id: Uuid, word: &str) -> PersistenceResult<()> {
        let mut words = self.words.write().await;
        let entry = words
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))?;
        entry.word = word.to_string();
        Ok(())
    }

    async fn remove_word(&self, id: Uuid) -> PersistenceResult<()> {
        let mut words = self.words.write().await;
        let before = words.len();
        words.retain(|w| w.id != id);
        if words.len() == before {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClassifierLogStore for InMemoryStore {
    async fn record_call(&self, entry: &ClassifierCallLog) -> PersistenceResult<()> {
        self.classifier_calls.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_calls(
        &self,
        limit: i64,
        offset: i64,
    ) -> PersistenceResult<(Vec<ClassifierCallLog>, i64)> {
        let calls = self.classifier_calls.read().await;
        let total = calls.len() as i64;
        let page = calls
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> AuditRecord {
        AuditRecord::new("POST", path, None, serde_json::json!({}), None)
    }

    #[tokio::test]
    async fn insert_then_update_outcome() {
        let store = InMemoryStore::new();
        let r = record("/v1/chat/completions");
        let id = store.insert(&r).await.unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert!(!fetched.is_completed());

        store
            .update_outcome(
                id,
                &AuditOutcome::completed(200, serde_json::json!({}), Some("ok".into()), 12),
            )
            .await
            .unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.status, Some(200));
        assert_eq!(fetched.duration_ms, Some(12));
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update_outcome(Uuid::new_v4(), &AuditOutcome::failed("x", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_page_is_newest_first_with_total() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.insert(&record(&format!("/p{i}"))).await.unwrap();
        }
        let (page, total) = store.list_page(2, 0).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].path, "/p4");
        assert_eq!(page[1].path, "/p3");

        let (page, _) = store.list_page(2, 4).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].path, "/p0");
    }

    #[tokio::test]
    async fn prune_removes_old_records_only() {
        let store = InMemoryStore::new();
        let mut old = record("/old");
        old.timestamp = Utc::now() - Duration::days(10);
        store.insert(&old).await.unwrap();
        store.insert(&record("/new")).await.unwrap();

        let pruned = store.prune_older_than(7).await.unwrap();
        assert_eq!(pruned, 1);
        let (page, total) = store.list_page(10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].path, "/new");
    }

    #[tokio::test]
    async fn words_keep_insertion_order() {
        let store = InMemoryStore::new();
        for w in ["alpha", "beta", "gamma"] {
            store.add_word(&PolicyWord::new(w)).await.unwrap();
        }
        let words = store.list_words().await.unwrap();
        let texts: Vec<&str> = words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(texts, ["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn update_word_keeps_position() {
        let store = InMemoryStore::new();
        let a = PolicyWord::new("a");
        let b = PolicyWord::new("b");
        store.add_word(&a).await.unwrap();
        store.add_word(&b).await.unwrap();

        store.update_word(a.id, "a2").await.unwrap();
        let words = store.list_words().await.unwrap();
        assert_eq!(words[0].word, "a2");
        assert_eq!(words[1].word, "b");
    }

    #[tokio::test]
    async fn remove_missing_word_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.remove_word(Uuid::new_v4()).await,
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn classifier_log_appends_and_pages() {
        let store = InMemoryStore::new();
        for i in 0..3 {
            let entry = ClassifierCallLog::new(
                "test",
                &format!("content {i}"),
                vec!["w".into()],
                false,
                None,
                "pass",
                7,
            );
            store.record_call(&entry).await.unwrap();
        }
        let (page, total) = store.list_calls(2, 0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page[0].content_excerpt, "content 2");
    }
}
