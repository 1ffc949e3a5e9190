//! `sekisho-core` — contract layer of the Sekisho moderation proxy.
//!
//! This crate defines the *types and trait interfaces* shared by the
//! runtime crates.  No concrete I/O lives here — the HTTP server, the
//! upstream forwarder, and the classifier client belong in
//! `sekisho-gateway`; the audit datastore belongs in `sekisho-store`.
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              sekisho-core  (this crate)                     │
//! │  chat wire types + content extraction                       │
//! │  ModerationResult / ClassifierVerdict                       │
//! │  TextClassifier trait (fail-open port)                      │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              sekisho-gateway  (runtime crate)               │
//! │  ModerationEngine  (two-tier decision + policy cache)       │
//! │  HttpClassifier: impl TextClassifier                        │
//! │  ProxyServer  (axum HTTP server + interceptor pipeline)     │
//! │  UpstreamBackend  (reqwest forwarder + stream mirror)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod chat;
pub mod moderation;

pub use moderation::{BlockSource, ClassifierVerdict, ModerationResult, TextClassifier};
