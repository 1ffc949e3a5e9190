//! Axum-based HTTP proxy server.
//!
//! [`ProxyServer`] wires the moderation engine, the upstream forwarder, and
//! the audit store into a running axum service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check + configured upstream target. |
//! | `ANY`  | `/proxy/{*path}` | The moderation pipeline — see [`crate::intercept`]. |
//! | —      | `/api/…` | Store-backed admin API — see [`crate::admin`]. |

use crate::admin;
use crate::classifier::{HttpClassifier, HttpClassifierConfig};
use crate::error::GatewayResult;
use crate::intercept;
use crate::moderation::ModerationEngine;
use crate::upstream::UpstreamBackend;
use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{any, get},
};
use sekisho_core::moderation::TextClassifier;
use sekisho_store::ModerationStore;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

// ─────────────────────────────────────────────────────────────────────────────
// Shared application state
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state injected into every axum handler via [`State`] extractor.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ModerationEngine>,
    pub upstream: Arc<UpstreamBackend>,
    pub store: Arc<dyn ModerationStore>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ProxyServerConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime configuration for [`ProxyServer`].
#[derive(Debug, Clone)]
pub struct ProxyServerConfig {
    /// TCP port to listen on (default: 3000).
    pub port: u16,
    /// OpenAI-compatible upstream base URL.
    pub upstream_url: String,
    /// Upstream read timeout in seconds (between-chunk silence bound).
    pub upstream_timeout_secs: u64,
    /// Tier-2 classifier configuration.  `None` disables the tier.
    pub classifier: Option<HttpClassifierConfig>,
}

impl Default for ProxyServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            upstream_url: "https://api.openai.com".to_string(),
            upstream_timeout_secs: 120,
            classifier: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProxyServer
// ─────────────────────────────────────────────────────────────────────────────

/// High-level proxy server encapsulating engine, forwarder, and store.
pub struct ProxyServer {
    config: ProxyServerConfig,
}

impl ProxyServer {
    /// Create a new server from the given configuration.
    pub fn new(config: ProxyServerConfig) -> Self {
        Self { config }
    }

    /// Construct the shared state: forwarder, classifier port, and the
    /// moderation engine with its policy cache loaded from the store.
    ///
    /// Fails fast when the upstream URL is invalid or the initial word-list
    /// load errors — starting with a silently empty policy set would turn a
    /// store outage into an open gate.
    pub async fn build_state(&self, store: Arc<dyn ModerationStore>) -> GatewayResult<AppState> {
        let upstream = Arc::new(UpstreamBackend::new(
            &self.config.upstream_url,
            self.config.upstream_timeout_secs,
        )?);

        let classifier: Option<Arc<dyn TextClassifier>> = self
            .config
            .classifier
            .clone()
            .map(|cfg| Arc::new(HttpClassifier::new(cfg)) as Arc<dyn TextClassifier>);

        let engine = Arc::new(ModerationEngine::new(store.clone(), classifier));
        let word_count = engine.reload().await?;
        info!(word_count, "policy word list loaded");

        Ok(AppState {
            engine,
            upstream,
            store,
        })
    }

    /// Build the axum [`Router`] for the given state.  Split from
    /// [`start()`](Self::start) so tests can drive the router directly.
    pub fn build_app(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .merge(admin::admin_router())
            .route("/proxy/{*path}", any(intercept::intercept_handler))
            .with_state(state)
    }

    /// Bind the server to `0.0.0.0:{port}` and serve until the process exits.
    pub async fn start(self, store: Arc<dyn ModerationStore>) -> GatewayResult<()> {
        let state = self.build_state(store).await?;
        let upstream = state.upstream.base_url().to_string();
        let app = Self::build_app(state);
        let addr = format!("0.0.0.0:{}", self.config.port);
        info!(addr = %addr, upstream = %upstream, "Sekisho moderation proxy starting");

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::error::GatewayError::Internal(e.to_string()))?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| crate::error::GatewayError::Internal(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health` — liveness probe, reporting the configured upstream so
/// operators can confirm where traffic is going without reading config.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "sekisho-gateway",
        "upstream": state.upstream.base_url(),
    }))
}
