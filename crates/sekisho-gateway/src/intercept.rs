//! Interceptor/correlator — the pipeline spine.
//!
//! Every request under the proxy mount runs through one logical sequence:
//!
//! ```text
//! received → (extracted | skip-moderation) → decided
//!          → blocked-terminal                 (synthesize, upstream never contacted)
//!          → forwarding → completed | error   (relay + mirror, audit update)
//! ```
//!
//! All per-request state travels in a [`RequestContext`] — never in shared
//! mutable globals — so concurrent pipelines cannot leak into each other
//! across the classifier and forwarding suspension points.
//!
//! Audit persistence is subordinate to the pipeline's primary duty: a
//! failed insert or update is logged and swallowed, never surfaced to the
//! caller or allowed to change the moderation outcome.

use crate::error::GatewayError;
use crate::moderation::synthesizer;
use crate::server::AppState;
use crate::upstream;
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use sekisho_core::chat::{CompletionRequest, extract};
use sekisho_core::moderation::ModerationResult;
use sekisho_store::{AuditOutcome, AuditRecord, AuditStore};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

/// Typed per-request context threaded through the pipeline stages.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Ties the intercept-time audit record to its completion update.
    pub correlation_id: Uuid,
    pub started: Instant,
    /// Model declared by the request, echoed in synthesized responses.
    pub model: Option<String>,
    /// Whether the caller asked for an SSE stream.
    pub stream: bool,
}

impl RequestContext {
    fn elapsed_ms(&self) -> i64 {
        i64::try_from(self.started.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// `ANY /proxy/{*path}` — the moderation pipeline entry point.
pub async fn intercept_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(rest): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/{rest}");
    let query = uri.query().map(str::to_string);

    // ── received: open the correlation context ──────────────────────────────
    let record = AuditRecord::new(
        method.as_str(),
        &path,
        query.clone(),
        headers_to_json(&headers),
        (!body.is_empty()).then(|| String::from_utf8_lossy(&body).into_owned()),
    );
    let parsed: CompletionRequest = serde_json::from_slice(&body).unwrap_or_default();
    let ctx = RequestContext {
        correlation_id: record.id,
        started: Instant::now(),
        model: parsed.model.clone(),
        stream: parsed.stream.unwrap_or(false),
    };

    if let Err(e) = state.store.insert(&record).await {
        warn!(
            correlation_id = %ctx.correlation_id,
            error = %e,
            "failed to persist audit record"
        );
    }

    // ── extracted | skip-moderation → decided ───────────────────────────────
    let decision = match extract::from_request(&parsed) {
        Some(text) => state.engine.decide(&text).await,
        None => ModerationResult::Clean,
    };

    // ── blocked-terminal ────────────────────────────────────────────────────
    let annotation = decision.annotation();
    if let ModerationResult::Blocked {
        term,
        source,
        reason,
    } = decision
    {
        info!(
            correlation_id = %ctx.correlation_id,
            term = %term,
            source = %source,
            "request blocked by content policy"
        );
        let synthesized = synthesizer::synthesize(&term, &reason, ctx.model.as_deref(), ctx.stream);
        let outcome = AuditOutcome::blocked(
            synthesized.body.clone(),
            annotation.unwrap_or_default(),
            ctx.elapsed_ms(),
        );
        if let Err(e) = state.store.update_outcome(ctx.correlation_id, &outcome).await {
            warn!(
                correlation_id = %ctx.correlation_id,
                error = %e,
                "failed to persist blocked-request outcome"
            );
        }
        return synthesized.into_response();
    }

    // ── forwarding → completed | error ──────────────────────────────────────
    forward_and_mirror(state, ctx, method, path, query, headers, body, peer).await
}

/// Relay the request upstream, stream the response back to the caller while
/// mirroring it into a capture buffer, and write the audit outcome once the
/// stream ends (or breaks).
#[allow(clippy::too_many_arguments)]
async fn forward_and_mirror(
    state: AppState,
    ctx: RequestContext,
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    peer: SocketAddr,
) -> Response {
    let path_and_query = match &query {
        Some(q) => format!("{path}?{q}"),
        None => path.clone(),
    };

    let upstream_response = match state
        .upstream
        .forward(method, &path_and_query, &headers, body, Some(peer.ip()))
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(
                correlation_id = %ctx.correlation_id,
                error = %e,
                "upstream forward failed"
            );
            let outcome = AuditOutcome::failed(e.to_string(), ctx.elapsed_ms());
            if let Err(pe) = state.store.update_outcome(ctx.correlation_id, &outcome).await {
                warn!(
                    correlation_id = %ctx.correlation_id,
                    error = %pe,
                    "failed to persist error outcome"
                );
            }
            return e.into_response();
        }
    };

    let status = upstream_response.status();
    let response_headers = upstream::filter_response_headers(upstream_response.headers());
    let response_headers_json = headers_to_json(&response_headers);

    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(32);
    let store = state.store.clone();
    let correlation_id = ctx.correlation_id;
    let started = ctx.started;
    let status_code = status.as_u16();

    tokio::spawn(async move {
        let mut captured: Vec<u8> = Vec::new();
        let mut stream = upstream_response.bytes_stream();
        let mut client_gone = false;
        let mut transport_error: Option<String> = None;

        while let Some(next) = stream.next().await {
            match next {
                Ok(chunk) => {
                    captured.extend_from_slice(&chunk);
                    if tx.send(Ok(chunk)).await.is_err() {
                        // Caller disconnected: stop mirroring further
                        // chunks, keep what was captured so far.
                        client_gone = true;
                        break;
                    }
                }
                Err(e) => {
                    transport_error = Some(e.to_string());
                    let _ = tx
                        .send(Err(std::io::Error::other(e.to_string())))
                        .await;
                    break;
                }
            }
        }
        drop(tx);

        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let mut outcome = AuditOutcome::completed(
            status_code,
            response_headers_json,
            (!captured.is_empty()).then(|| String::from_utf8_lossy(&captured).into_owned()),
            duration_ms,
        );
        if client_gone {
            outcome = outcome.with_error("client disconnected during streaming");
        } else if let Some(e) = transport_error {
            outcome = outcome.with_error(format!("upstream stream error: {e}"));
        }

        if let Err(e) = store.update_outcome(correlation_id, &outcome).await {
            warn!(
                correlation_id = %correlation_id,
                error = %e,
                "failed to persist audit outcome"
            );
        } else {
            info!(
                correlation_id = %correlation_id,
                status = status_code,
                latency_ms = duration_ms,
                "forwarded request completed"
            );
        }
    });

    let mut builder = Response::builder().status(status);
    for (name, value) in response_headers.iter() {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap_or_else(|e| GatewayError::Internal(e.to_string()).into_response())
}

/// Lossy JSON view of a header map for the audit trail.  Duplicate names
/// collapse to the last value; audit capture does not need full fidelity.
pub(crate) fn headers_to_json(headers: &HeaderMap) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                serde_json::Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })
        .collect();
    serde_json::Value::Object(map)
}
