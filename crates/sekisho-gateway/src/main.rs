//! Sekisho moderation proxy — entry point.
//!
//! Reads configuration from environment variables and starts the axum-based
//! HTTP proxy service.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SEKISHO_PORT` | `3000` | TCP port to listen on. |
//! | `SEKISHO_UPSTREAM_URL` | `https://api.openai.com` | Chat-completion backend base URL. |
//! | `SEKISHO_UPSTREAM_TIMEOUT_SECS` | `120` | Upstream read timeout. |
//! | `SEKISHO_DATABASE_URL` | `sqlite:sekisho.db?mode=rwc` | Audit store; the literal `memory` selects the volatile in-memory store. |
//! | `SEKISHO_CLASSIFIER_ENABLED` | *(off)* | `1`/`true` enables tier-2 moderation. |
//! | `SEKISHO_CLASSIFIER_URL` | `https://api.openai.com` | Classifier endpoint base URL. |
//! | `SEKISHO_CLASSIFIER_API_KEY` | *(none)* | Classifier API key — tier-2 is skipped without it. |
//! | `SEKISHO_CLASSIFIER_MODEL` | `gpt-4o-mini` | Classifier model. |
//! | `SEKISHO_CLASSIFIER_TIMEOUT_SECS` | `15` | Per-call classifier timeout. |

use sekisho_gateway::classifier::HttpClassifierConfig;
use sekisho_gateway::server::{ProxyServer, ProxyServerConfig};
use sekisho_store::{InMemoryStore, ModerationStore, SqliteStore};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("sekisho_gateway=info".parse().unwrap()),
        )
        .init();

    let port: u16 = std::env::var("SEKISHO_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);

    let upstream_url = std::env::var("SEKISHO_UPSTREAM_URL")
        .unwrap_or_else(|_| "https://api.openai.com".to_string());

    let upstream_timeout_secs: u64 = std::env::var("SEKISHO_UPSTREAM_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(120);

    let database_url = std::env::var("SEKISHO_DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:sekisho.db?mode=rwc".to_string());

    let classifier_enabled = std::env::var("SEKISHO_CLASSIFIER_ENABLED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let store: Arc<dyn ModerationStore> = if database_url == "memory" {
        warn!("using the in-memory store — the audit trail will not survive a restart");
        InMemoryStore::shared()
    } else {
        match SqliteStore::shared(&database_url).await {
            Ok(store) => store,
            Err(e) => {
                eprintln!("failed to open audit store '{database_url}': {e}");
                std::process::exit(1);
            }
        }
    };

    let classifier = classifier_enabled.then(HttpClassifierConfig::from_env);
    if let Some(cfg) = &classifier {
        if cfg.api_key.is_none() {
            warn!(
                "SEKISHO_CLASSIFIER_ENABLED is set but SEKISHO_CLASSIFIER_API_KEY is missing \
                 — tier-2 moderation will be skipped"
            );
        }
    }

    info!(
        port,
        upstream = %upstream_url,
        classifier_enabled,
        "Sekisho configuration loaded"
    );

    let server = ProxyServer::new(ProxyServerConfig {
        port,
        upstream_url,
        upstream_timeout_secs,
        classifier,
    });

    if let Err(e) = server.start(store).await {
        eprintln!("Gateway error: {e}");
        std::process::exit(1);
    }
}
