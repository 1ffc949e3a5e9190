//! Core persistence traits.
//!
//! Interfaces every storage backend must implement.  The moderation
//! pipeline only ever talks to these traits — backend selection happens
//! once, at startup.

use super::entities::*;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence error.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("persistence error: {0}")]
    Other(String),
}

/// Persistence result type.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Audit trail store.
///
/// One row per inbound request.  Creation always happens-before the
/// outcome update for the same id; the update is applied at most once.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist the intercept-time record.  Returns the correlation id.
    async fn insert(&self, record: &AuditRecord) -> PersistenceResult<Uuid>;

    /// Write the completion outcome onto an existing record.
    async fn update_outcome(&self, id: Uuid, outcome: &AuditOutcome) -> PersistenceResult<()>;

    /// Fetch a single record.
    async fn get(&self, id: Uuid) -> PersistenceResult<Option<AuditRecord>>;

    /// Newest-first page of records plus the total count.
    async fn list_page(
        &self,
        limit: i64,
        offset: i64,
    ) -> PersistenceResult<(Vec<AuditRecord>, i64)>;

    /// Delete records older than `days` days.  Returns the deleted count.
    async fn prune_older_than(&self, days: i64) -> PersistenceResult<i64>;
}

/// Policy word set store.
///
/// `list_words` returns words in stored (insertion) order — the matcher
/// resolves ties by taking the first hit in this order.
#[async_trait]
pub trait PolicyWordStore: Send + Sync {
    async fn list_words(&self) -> PersistenceResult<Vec<PolicyWord>>;

    async fn add_word(&self, word: &PolicyWord) -> PersistenceResult<()>;

    /// Replace the text of an existing word, keeping its position.
    async fn update_word(&self, id: Uuid, word: &str) -> PersistenceResult<()>;

    async fn remove_word(&self, id: Uuid) -> PersistenceResult<()>;
}

/// Append-only classifier activity log.
#[async_trait]
pub trait ClassifierLogStore: Send + Sync {
    async fn record_call(&self, entry: &ClassifierCallLog) -> PersistenceResult<()>;

    /// Newest-first page of classifier calls plus the total count.
    async fn list_calls(
        &self,
        limit: i64,
        offset: i64,
    ) -> PersistenceResult<(Vec<ClassifierCallLog>, i64)>;
}

/// The whole datastore behind one handle.
pub trait ModerationStore: AuditStore + PolicyWordStore + ClassifierLogStore {}

impl<S> ModerationStore for S where S: AuditStore + PolicyWordStore + ClassifierLogStore {}
