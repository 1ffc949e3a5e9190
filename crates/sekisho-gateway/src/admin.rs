//! Store-backed admin API.
//!
//! The JSON surface the operator dashboard consumes: audit trail reads and
//! pruning, policy word CRUD, explicit cache reload, and the classifier
//! activity log.  Word mutations refresh the engine cache immediately so
//! the matcher never runs against a stale set longer than one call.

use crate::error::{GatewayError, GatewayResult};
use crate::server::AppState;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use sekisho_store::{
    AuditStore, ClassifierLogStore, PersistenceError, PolicyWord, PolicyWordStore,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

const DEFAULT_PAGE_LIMIT: i64 = 50;
const MAX_PAGE_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct PruneQuery {
    pub days: i64,
}

#[derive(Debug, Deserialize)]
pub struct WordBody {
    pub word: String,
}

/// Build the admin sub-router.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/audit", get(list_audit).delete(prune_audit))
        .route("/api/audit/{id}", get(get_audit))
        .route("/api/words", get(list_words).post(add_word))
        .route("/api/words/reload", post(reload_words))
        .route("/api/words/{id}", put(update_word).delete(remove_word))
        .route("/api/classifier-log", get(list_classifier_calls))
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit trail
// ─────────────────────────────────────────────────────────────────────────────

async fn list_audit(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> GatewayResult<impl IntoResponse> {
    let (records, total) = state.store.list_page(page.limit(), page.offset()).await?;
    Ok(Json(json!({ "records": records, "total": total })))
}

async fn get_audit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> GatewayResult<impl IntoResponse> {
    let record = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("audit record '{id}'")))?;
    Ok(Json(record))
}

async fn prune_audit(
    State(state): State<AppState>,
    Query(prune): Query<PruneQuery>,
) -> GatewayResult<impl IntoResponse> {
    if prune.days < 0 {
        return Err(GatewayError::InvalidRequest(
            "days must be non-negative".to_string(),
        ));
    }
    let pruned = state.store.prune_older_than(prune.days).await?;
    Ok(Json(json!({ "pruned": pruned })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy words
// ─────────────────────────────────────────────────────────────────────────────

async fn list_words(State(state): State<AppState>) -> GatewayResult<impl IntoResponse> {
    let words = state.store.list_words().await?;
    Ok(Json(json!({ "words": words })))
}

async fn add_word(
    State(state): State<AppState>,
    Json(body): Json<WordBody>,
) -> GatewayResult<impl IntoResponse> {
    let text = body.word.trim();
    if text.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "word cannot be empty".to_string(),
        ));
    }

    let word = PolicyWord::new(text);
    state.store.add_word(&word).await?;
    state.engine.reload().await?;
    Ok((StatusCode::CREATED, Json(word)))
}

async fn update_word(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<WordBody>,
) -> GatewayResult<impl IntoResponse> {
    let text = body.word.trim();
    if text.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "word cannot be empty".to_string(),
        ));
    }

    state
        .store
        .update_word(id, text)
        .await
        .map_err(|e| word_not_found(id, e))?;
    state.engine.reload().await?;
    Ok(Json(json!({ "id": id, "word": text })))
}

async fn remove_word(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> GatewayResult<impl IntoResponse> {
    state
        .store
        .remove_word(id)
        .await
        .map_err(|e| word_not_found(id, e))?;
    state.engine.reload().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reload_words(State(state): State<AppState>) -> GatewayResult<impl IntoResponse> {
    let count = state.engine.reload().await?;
    Ok(Json(json!({ "words": count })))
}

fn word_not_found(id: Uuid, e: PersistenceError) -> GatewayError {
    match e {
        PersistenceError::NotFound(_) => GatewayError::NotFound(format!("policy word '{id}'")),
        other => other.into(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Classifier activity
// ─────────────────────────────────────────────────────────────────────────────

async fn list_classifier_calls(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> GatewayResult<impl IntoResponse> {
    let (calls, total) = state.store.list_calls(page.limit(), page.offset()).await?;
    Ok(Json(json!({ "calls": calls, "total": total })))
}
