//! Gateway endpoint lookup.

use std::future::Future;
use std::time::Duration;

use gatelink_proto::Encoding;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::{GatewayError, GatewayResult};

/// Remaining session starts at or below which a warning is logged.
pub const SESSION_START_WARN_THRESHOLD: u32 = 100;

/// Session-start budget reported by the lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartLimit {
    /// Session starts allowed per reset period.
    pub total: u32,
    /// Session starts left.
    pub remaining: u32,
    /// Milliseconds until the budget resets.
    pub reset_after: u64,
    /// Identifies allowed concurrently.
    #[serde(default)]
    pub max_concurrency: Option<u32>,
}

/// Result of the endpoint lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayBotInfo {
    /// Base gateway URL.
    pub url: String,
    /// Recommended shard count.
    #[serde(default)]
    pub shards: Option<u32>,
    /// Session-start budget.
    #[serde(default)]
    pub session_start_limit: Option<SessionStartLimit>,
}

impl GatewayBotInfo {
    /// Log the session-start budget, warning when it runs low.
    pub fn log_session_budget(&self) {
        let Some(limit) = &self.session_start_limit else {
            return;
        };
        let reset_after = Duration::from_millis(limit.reset_after);
        if limit.remaining == 0 {
            warn!(
                total = limit.total,
                ?reset_after,
                "session start budget exhausted"
            );
        } else if limit.remaining <= SESSION_START_WARN_THRESHOLD {
            warn!(
                remaining = limit.remaining,
                total = limit.total,
                ?reset_after,
                "session start budget running low"
            );
        } else {
            info!(
                remaining = limit.remaining,
                total = limit.total,
                "session start budget"
            );
        }
    }
}

/// Looks up the gateway endpoint for a credential.
pub trait EndpointResolver: Send + Sync + 'static {
    /// Resolve the base gateway URL.
    fn resolve(&self, credential: &str) -> impl Future<Output = GatewayResult<GatewayBotInfo>> + Send;
}

/// Resolver calling `GET {api_base_url}/gateway/bot`.
#[derive(Debug, Clone)]
pub struct HttpEndpointResolver {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpEndpointResolver {
    /// Create a resolver for `api_base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_base_url: impl Into<String>) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("gatelink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::EndpointLookup(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base_url: api_base_url.into(),
        })
    }

    /// Lookup URL.
    #[must_use]
    pub fn lookup_url(&self) -> String {
        format!("{}/gateway/bot", self.api_base_url.trim_end_matches('/'))
    }
}

impl EndpointResolver for HttpEndpointResolver {
    async fn resolve(&self, credential: &str) -> GatewayResult<GatewayBotInfo> {
        let response = self
            .client
            .get(self.lookup_url())
            .header(reqwest::header::AUTHORIZATION, format!("Bot {credential}"))
            .send()
            .await
            .map_err(|e| GatewayError::EndpointLookup(format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GatewayError::Auth(format!(
                "endpoint lookup rejected the credential ({status})"
            )));
        }
        if !status.is_success() {
            return Err(GatewayError::EndpointLookup(format!(
                "unexpected status {status}"
            )));
        }

        let info: GatewayBotInfo = response
            .json()
            .await
            .map_err(|e| GatewayError::EndpointLookup(format!("invalid response body: {e}")))?;
        info.log_session_budget();
        Ok(info)
    }
}

/// Resolver returning a fixed URL.
#[derive(Debug, Clone)]
pub struct StaticEndpoint {
    url: String,
}

impl StaticEndpoint {
    /// Always resolve to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl EndpointResolver for StaticEndpoint {
    async fn resolve(&self, _credential: &str) -> GatewayResult<GatewayBotInfo> {
        Ok(GatewayBotInfo {
            url: self.url.clone(),
            shards: None,
            session_start_limit: None,
        })
    }
}

/// Append the version and encoding query to a gateway base URL.
///
/// Existing `v` and `encoding` parameters are replaced; others are kept.
///
/// # Errors
///
/// Returns an error if `base` is not a valid URL.
pub fn build_gateway_url(base: &str, version: u8, encoding: Encoding) -> GatewayResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| GatewayError::EndpointLookup(format!("invalid gateway url '{base}': {e}")))?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "v" && key != "encoding")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("v", &version.to_string())
        .append_pair("encoding", encoding.as_str());

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("wss://gateway.example.com", "wss://gateway.example.com/?v=8&encoding=json" ; "bare host")]
    #[test_case("wss://gateway.example.com/", "wss://gateway.example.com/?v=8&encoding=json" ; "trailing slash")]
    #[test_case("wss://gateway.example.com/?v=6&encoding=etf", "wss://gateway.example.com/?v=8&encoding=json" ; "replaces existing")]
    #[test_case("wss://gateway.example.com/?compress=zlib-stream", "wss://gateway.example.com/?compress=zlib-stream&v=8&encoding=json" ; "keeps other params")]
    fn test_build_gateway_url(base: &str, expected: &str) {
        let url = build_gateway_url(base, 8, Encoding::Json).expect("valid url");
        assert_eq!(url.as_str(), expected);
    }

    #[test]
    fn test_build_gateway_url_etf() {
        let url = build_gateway_url("wss://gateway.example.com", 9, Encoding::Etf).unwrap();
        assert_eq!(url.query(), Some("v=9&encoding=etf"));
    }

    #[test]
    fn test_build_gateway_url_invalid() {
        let result = build_gateway_url("not a url", 8, Encoding::Json);
        assert!(matches!(result, Err(GatewayError::EndpointLookup(_))));
    }

    #[test]
    fn test_parse_gateway_bot_response() {
        let body = r#"{
            "url": "wss://gateway.example.com",
            "shards": 4,
            "session_start_limit": {
                "total": 1000,
                "remaining": 42,
                "reset_after": 14400000,
                "max_concurrency": 1
            }
        }"#;
        let info: GatewayBotInfo = serde_json::from_str(body).unwrap();
        assert_eq!(info.url, "wss://gateway.example.com");
        assert_eq!(info.shards, Some(4));
        let limit = info.session_start_limit.as_ref().unwrap();
        assert_eq!(limit.remaining, 42);
        assert_eq!(limit.max_concurrency, Some(1));
        info.log_session_budget();
    }

    #[test]
    fn test_parse_minimal_response() {
        let info: GatewayBotInfo =
            serde_json::from_str(r#"{"url": "wss://gateway.example.com"}"#).unwrap();
        assert!(info.shards.is_none());
        assert!(info.session_start_limit.is_none());
    }

    #[test]
    fn test_lookup_url() {
        let resolver = HttpEndpointResolver::new("https://api.example.com/api/v8/").unwrap();
        assert_eq!(resolver.lookup_url(), "https://api.example.com/api/v8/gateway/bot");
    }

    #[tokio::test]
    async fn test_static_endpoint() {
        let resolver = StaticEndpoint::new("ws://127.0.0.1:9000");
        let info = resolver.resolve("tok").await.unwrap();
        assert_eq!(info.url, "ws://127.0.0.1:9000");
    }
}
