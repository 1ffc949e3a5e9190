//! `sekisho-gateway` — runtime of the Sekisho moderation proxy.
//!
//! This crate provides the concrete implementations of the contracts
//! defined in `sekisho-core`:
//!
//! | Core contract | Implementation |
//! |---------------|----------------|
//! | [`TextClassifier`](sekisho_core::TextClassifier) | [`classifier::HttpClassifier`] |
//! | moderation decision | [`moderation::ModerationEngine`] |
//! | response synthesis | [`moderation::synthesizer`] |
//!
//! The [`server::ProxyServer`] wires everything into an axum HTTP service:
//! requests under `/proxy/` run through the interceptor pipeline
//! ([`intercept`]), clean requests are relayed by
//! [`upstream::UpstreamBackend`], blocked requests are answered with a
//! wire-compatible synthesized refusal, and every request leaves a durable
//! audit record in a `sekisho-store` backend.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use sekisho_gateway::server::{ProxyServer, ProxyServerConfig};
//! use sekisho_store::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ProxyServer::new(ProxyServerConfig {
//!         port: 3000,
//!         upstream_url: "https://api.openai.com".to_string(),
//!         ..Default::default()
//!     });
//!
//!     server.start(InMemoryStore::shared()).await.unwrap();
//! }
//! ```

pub mod admin;
pub mod classifier;
pub mod error;
pub mod intercept;
pub mod moderation;
pub mod server;
pub mod upstream;

pub use error::{GatewayError, GatewayResult};
