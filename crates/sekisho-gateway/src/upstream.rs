//! Upstream backend forwarder.
//!
//! [`UpstreamBackend`] relays requests to the configured OpenAI-compatible
//! base URL and hands back the raw `reqwest::Response` so the interceptor
//! can stream the body to the caller while mirroring it for audit capture.
//!
//! The forwarder is intentionally transparent: it never parses or modifies
//! the request/response JSON, which keeps it forward-compatible with new
//! model parameters without code changes.

use crate::error::{GatewayError, GatewayResult};
use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, instrument};

/// Request headers that must not be relayed verbatim.  `host` and
/// `content-length` are recomputed by the HTTP client; the rest are
/// hop-by-hop.
const SKIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-authorization",
];

/// Hop-by-hop response headers stripped before the body is re-framed for
/// the caller.
const SKIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-authenticate",
];

/// Proxies requests to an OpenAI-compatible REST API endpoint.
pub struct UpstreamBackend {
    base_url: String,
    client: reqwest::Client,
}

impl UpstreamBackend {
    /// Create a new forwarder.
    ///
    /// `read_timeout_secs` bounds how long the upstream may go silent
    /// between chunks — a total-request timeout would kill legitimate
    /// long-lived streams.
    pub fn new(base_url: &str, read_timeout_secs: u64) -> GatewayResult<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(GatewayError::Config(format!(
                "upstream URL '{base_url}' must be absolute (http:// or https://)"
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("failed to build reqwest client");

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Forward the request verbatim to `{base_url}{path_and_query}`.
    ///
    /// Returns the raw response so the caller can stream the body.  Any
    /// transport failure maps to [`GatewayError::Upstream`]; upstream HTTP
    /// error statuses are *not* errors here — they are relayed like any
    /// other response.
    #[instrument(skip(self, headers, body), fields(path = %path_and_query))]
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
        client_ip: Option<IpAddr>,
    ) -> GatewayResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!(url = %url, "forwarding to upstream");

        self.client
            .request(method, &url)
            .headers(rewrite_request_headers(headers, client_ip))
            .body(body)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))
    }
}

/// Drop hop-by-hop request headers and stamp the standard forwarding
/// headers: the peer address is appended to `x-forwarded-for`, and
/// `x-forwarded-proto` is set when the caller didn't already carry one
/// (TLS terminates in front of this service).
pub fn rewrite_request_headers(headers: &HeaderMap, client_ip: Option<IpAddr>) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if SKIPPED_REQUEST_HEADERS.contains(&name.as_str()) || name.as_str() == "x-forwarded-for" {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    if let Some(ip) = client_ip {
        let forwarded = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{existing}, {ip}"),
            None => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded) {
            out.insert("x-forwarded-for", value);
        }
    } else if let Some(existing) = headers.get("x-forwarded-for") {
        out.insert("x-forwarded-for", existing.clone());
    }

    if !out.contains_key("x-forwarded-proto") {
        out.insert("x-forwarded-proto", HeaderValue::from_static("http"));
    }

    out
}

/// Strip hop-by-hop headers from an upstream response before re-framing.
pub fn filter_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if SKIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                axum::http::HeaderName::try_from(*k).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn host_and_hop_by_hop_are_dropped() {
        let rewritten = rewrite_request_headers(
            &headers(&[
                ("host", "proxy.example"),
                ("connection", "keep-alive"),
                ("content-length", "42"),
                ("authorization", "Bearer sk-test"),
            ]),
            None,
        );
        assert!(rewritten.get("host").is_none());
        assert!(rewritten.get("connection").is_none());
        assert!(rewritten.get("content-length").is_none());
        assert_eq!(rewritten.get("authorization").unwrap(), "Bearer sk-test");
    }

    #[test]
    fn peer_ip_is_appended_to_forwarded_for() {
        let ip: IpAddr = "10.0.0.7".parse().unwrap();

        let fresh = rewrite_request_headers(&headers(&[]), Some(ip));
        assert_eq!(fresh.get("x-forwarded-for").unwrap(), "10.0.0.7");

        let chained = rewrite_request_headers(
            &headers(&[("x-forwarded-for", "203.0.113.5")]),
            Some(ip),
        );
        assert_eq!(
            chained.get("x-forwarded-for").unwrap(),
            "203.0.113.5, 10.0.0.7"
        );
    }

    #[test]
    fn forwarded_proto_is_set_but_not_overwritten() {
        let fresh = rewrite_request_headers(&headers(&[]), None);
        assert_eq!(fresh.get("x-forwarded-proto").unwrap(), "http");

        let existing =
            rewrite_request_headers(&headers(&[("x-forwarded-proto", "https")]), None);
        assert_eq!(existing.get("x-forwarded-proto").unwrap(), "https");
    }

    #[test]
    fn response_filter_keeps_content_headers() {
        let filtered = filter_response_headers(&headers(&[
            ("content-type", "text/event-stream"),
            ("transfer-encoding", "chunked"),
            ("connection", "close"),
        ]));
        assert_eq!(filtered.get("content-type").unwrap(), "text/event-stream");
        assert!(filtered.get("transfer-encoding").is_none());
        assert!(filtered.get("connection").is_none());
    }

    #[test]
    fn relative_upstream_url_is_rejected() {
        assert!(UpstreamBackend::new("api.openai.com", 120).is_err());
        assert!(UpstreamBackend::new("https://api.openai.com/", 120).is_ok());
    }
}
