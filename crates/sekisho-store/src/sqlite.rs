//! SQLite storage backend.
//!
//! Durable persistence for single-node deployments.  Uuids and timestamps
//! are stored as TEXT (hyphenated / RFC 3339); policy-word precedence is
//! the physical insertion order (`rowid`).

use super::entities::*;
use super::traits::*;
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use std::sync::Arc;
use uuid::Uuid;

/// SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> PersistenceResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub async fn in_memory() -> PersistenceResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn shared(database_url: &str) -> PersistenceResult<Arc<Self>> {
        Ok(Arc::new(Self::connect(database_url).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_record (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                method TEXT NOT NULL,
                path TEXT NOT NULL,
                query TEXT,
                request_headers TEXT NOT NULL,
                request_body TEXT,
                status INTEGER,
                response_headers TEXT,
                response_body TEXT,
                duration_ms INTEGER,
                error TEXT,
                block_reason TEXT
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS policy_word (
                id TEXT PRIMARY KEY,
                word TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS classifier_call (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                classifier TEXT NOT NULL,
                content_excerpt TEXT NOT NULL,
                words TEXT NOT NULL,
                blocked INTEGER NOT NULL,
                matched_word TEXT,
                reason TEXT NOT NULL,
                latency_ms INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_record(timestamp)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        Ok(())
    }

    fn parse_audit_row(row: &SqliteRow) -> PersistenceResult<AuditRecord> {
        let id_str: String = row
            .try_get("id")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let id =
            Uuid::parse_str(&id_str).map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let timestamp_str: String = row
            .try_get("timestamp")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?
            .with_timezone(&chrono::Utc);

        let headers_str: String = row
            .try_get("request_headers")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let request_headers = serde_json::from_str(&headers_str)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let response_headers = row
            .try_get::<Option<String>, _>("response_headers")
            .ok()
            .flatten()
            .and_then(|s| serde_json::from_str(&s).ok());

        Ok(AuditRecord {
            id,
            timestamp,
            method: row
                .try_get("method")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            path: row
                .try_get("path")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            query: row.try_get("query").ok(),
            request_headers,
            request_body: row.try_get("request_body").ok(),
            status: row
                .try_get::<Option<i64>, _>("status")
                .ok()
                .flatten()
                .map(|s| s as u16),
            response_headers,
            response_body: row.try_get("response_body").ok(),
            duration_ms: row.try_get("duration_ms").ok(),
            error: row.try_get("error").ok(),
            block: row.try_get("block_reason").ok(),
        })
    }

    fn parse_word_row(row: &SqliteRow) -> PersistenceResult<PolicyWord> {
        let id_str: String = row
            .try_get("id")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let id =
            Uuid::parse_str(&id_str).map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let created_str: String = row
            .try_get("created_at")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_str)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?
            .with_timezone(&chrono::Utc);

        Ok(PolicyWord {
            id,
            word: row
                .try_get("word")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            created_at,
        })
    }

    fn parse_call_row(row: &SqliteRow) -> PersistenceResult<ClassifierCallLog> {
        let id_str: String = row
            .try_get("id")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let id =
            Uuid::parse_str(&id_str).map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let timestamp_str: String = row
            .try_get("timestamp")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?
            .with_timezone(&chrono::Utc);

        let words_str: String = row
            .try_get("words")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let words = serde_json::from_str(&words_str)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let blocked: i64 = row
            .try_get("blocked")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        Ok(ClassifierCallLog {
            id,
            timestamp,
            classifier: row
                .try_get("classifier")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            content_excerpt: row
                .try_get("content_excerpt")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            words,
            blocked: blocked != 0,
            matched_word: row.try_get("matched_word").ok(),
            reason: row
                .try_get("reason")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
            latency_ms: row
                .try_get("latency_ms")
                .map_err(|e| PersistenceError::Query(e.to_string()))?,
        })
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn insert(&self, record: &AuditRecord) -> PersistenceResult<Uuid> {
        let headers_json = serde_json::to_string(&record.request_headers)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO audit_record
            (id, timestamp, method, path, query, request_headers, request_body)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(record.id.to_string())
        .bind(record.timestamp.to_rfc3339())
        .bind(&record.method)
        .bind(&record.path)
        .bind(&record.query)
        .bind(headers_json)
        .bind(&record.request_body)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        Ok(record.id)
    }

    async fn update_outcome(&self, id: Uuid, outcome: &AuditOutcome) -> PersistenceResult<()> {
        let headers_json = outcome
            .response_headers
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE audit_record
            SET status = ?, response_headers = ?, response_body = ?,
                duration_ms = ?, error = ?, block_reason = ?
            WHERE id = ?
        "#,
        )
        .bind(outcome.status.map(|s| s as i64))
        .bind(headers_json)
        .bind(&outcome.response_body)
        .bind(outcome.duration_ms)
        .bind(&outcome.error)
        .bind(&outcome.block)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> PersistenceResult<Option<AuditRecord>> {
        let row = sqlx::query("SELECT * FROM audit_record WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(Self::parse_audit_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_page(
        &self,
        limit: i64,
        offset: i64,
    ) -> PersistenceResult<(Vec<AuditRecord>, i64)> {
        let rows = sqlx::query(
            "SELECT * FROM audit_record ORDER BY timestamp DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        let records = rows
            .iter()
            .map(Self::parse_audit_row)
            .collect::<PersistenceResult<Vec<_>>>()?;

        let row = sqlx::query("SELECT COUNT(*) as count FROM audit_record")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let total: i64 = row
            .try_get("count")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        Ok((records, total))
    }

    async fn prune_older_than(&self, days: i64) -> PersistenceResult<i64> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let result = sqlx::query("DELETE FROM audit_record WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        Ok(result.rows_affected() as i64)
    }
}

#[async_trait]
impl PolicyWordStore for SqliteStore {
    async fn list_words(&self) -> PersistenceResult<Vec<PolicyWord>> {
        let rows = sqlx::query("SELECT * FROM policy_word ORDER BY rowid ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        rows.iter().map(Self::parse_word_row).collect()
    }

    async fn add_word(&self, word: &PolicyWord) -> PersistenceResult<()> {
        sqlx::query("INSERT INTO policy_word (id, word, created_at) VALUES (?, ?, ?)")
            .bind(word.id.to_string())
            .bind(&word.word)
            .bind(word.created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        Ok(())
    }

    async fn update_word(&self, id: Uuid, word: &str) -> PersistenceResult<()> {
        let result = sqlx::query("UPDATE policy_word SET word = ? WHERE id = ?")
            .bind(word)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn remove_word(&self, id: Uuid) -> PersistenceResult<()> {
        let result = sqlx::query("DELETE FROM policy_word WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClassifierLogStore for SqliteStore {
    async fn record_call(&self, entry: &ClassifierCallLog) -> PersistenceResult<()> {
        let words_json = serde_json::to_string(&entry.words)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO classifier_call
            (id, timestamp, classifier, content_excerpt, words, blocked, matched_word, reason, latency_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.timestamp.to_rfc3339())
        .bind(&entry.classifier)
        .bind(&entry.content_excerpt)
        .bind(words_json)
        .bind(entry.blocked as i64)
        .bind(&entry.matched_word)
        .bind(&entry.reason)
        .bind(entry.latency_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_calls(
        &self,
        limit: i64,
        offset: i64,
    ) -> PersistenceResult<(Vec<ClassifierCallLog>, i64)> {
        let rows = sqlx::query(
            "SELECT * FROM classifier_call ORDER BY timestamp DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::Query(e.to_string()))?;

        let calls = rows
            .iter()
            .map(Self::parse_call_row)
            .collect::<PersistenceResult<Vec<_>>>()?;

        let row = sqlx::query("SELECT COUNT(*) as count FROM classifier_call")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PersistenceError::Query(e.to_string()))?;
        let total: i64 = row
            .try_get("count")
            .map_err(|e| PersistenceError::Query(e.to_string()))?;

        Ok((calls, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_an_audit_record() {
        let store = SqliteStore::in_memory().await.unwrap();
        let record = AuditRecord::new(
            "POST",
            "/v1/chat/completions",
            Some("stream=true".into()),
            serde_json::json!({"content-type": "application/json"}),
            Some(r#"{"model":"gpt-4o"}"#.into()),
        );
        let id = store.insert(&record).await.unwrap();

        store
            .update_outcome(
                id,
                &AuditOutcome::completed(
                    200,
                    serde_json::json!({"content-type": "application/json"}),
                    Some("body".into()),
                    42,
                ),
            )
            .await
            .unwrap();

        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.method, "POST");
        assert_eq!(fetched.query.as_deref(), Some("stream=true"));
        assert_eq!(fetched.status, Some(200));
        assert_eq!(fetched.duration_ms, Some(42));
        assert!(fetched.error.is_none());
    }

    #[tokio::test]
    async fn update_outcome_on_missing_row_is_not_found() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store
            .update_outcome(Uuid::new_v4(), &AuditOutcome::failed("x", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn words_list_in_insertion_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        for w in ["暴力", "violence", "gewalt"] {
            store.add_word(&PolicyWord::new(w)).await.unwrap();
        }
        let words = store.list_words().await.unwrap();
        let texts: Vec<&str> = words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(texts, ["暴力", "violence", "gewalt"]);
    }

    #[tokio::test]
    async fn classifier_call_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let entry = ClassifierCallLog::new(
            "http-classifier",
            "checked content",
            vec!["暴力".into()],
            true,
            Some("暴力".into()),
            "topic-adjacent reference",
            133,
        );
        store.record_call(&entry).await.unwrap();

        let (calls, total) = store.list_calls(10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert!(calls[0].blocked);
        assert_eq!(calls[0].matched_word.as_deref(), Some("暴力"));
        assert_eq!(calls[0].words, vec!["暴力".to_string()]);
    }
}
