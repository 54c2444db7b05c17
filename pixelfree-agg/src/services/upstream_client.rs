//! Pixelfed API client
//!
//! Authenticated GET requests against one Pixelfed/Mastodon-compatible
//! instance, wrapped in bounded retry for 429/5xx responses.

use crate::utils::{retry_transient, RetryPolicy, TransientError};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("PixelFree/", env!("CARGO_PKG_VERSION"));
/// Scratch origin used only to encode path segments
const PATH_BASE: &str = "http://localhost/";

/// Pixelfed client errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Non-success HTTP status (after retries, for 429/5xx)
    #[error("Upstream GET {path} failed ({status})")]
    Status {
        status: u16,
        path: String,
        body: Option<Value>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    /// Instance URL or request path that cannot form a valid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl TransientError for UpstreamError {
    fn is_transient(&self) -> bool {
        matches!(self.status(), Some(s) if s == 429 || (500..=599).contains(&s))
    }
}

/// Successful upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

/// Upstream API surface consumed by the resolver and aggregation engine
#[async_trait]
pub trait PixelfedApi: Send + Sync {
    /// GET `path` (server-relative) with bearer auth
    ///
    /// Parameters whose value is `None` or an empty string are omitted.
    async fn get_json(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// Drop unset and empty query parameters
pub fn request_params<'a>(params: &'a [(&'a str, Option<String>)]) -> Vec<(&'a str, &'a str)> {
    params
        .iter()
        .filter_map(|(key, value)| match value.as_deref() {
            Some(v) if !v.is_empty() => Some((*key, v)),
            _ => None,
        })
        .collect()
}

/// Build a server-relative API path from raw segments, percent-encoding
/// each one (`["api", "v1", "timelines", "tag", "café"]` →
/// `/api/v1/timelines/tag/caf%C3%A9`)
pub fn api_path(segments: &[&str]) -> Result<String, UpstreamError> {
    let mut url =
        reqwest::Url::parse(PATH_BASE).map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| UpstreamError::InvalidUrl(PATH_BASE.to_string()))?
        .clear()
        .extend(segments);
    Ok(url.path().to_string())
}

/// reqwest-backed client for one instance
pub struct PixelfedClient {
    http_client: reqwest::Client,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl PixelfedClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        retry_policy: RetryPolicy,
    ) -> Result<Self, UpstreamError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| UpstreamError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            retry_policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_once(
        &self,
        path: &str,
        access_token: &str,
        query: &[(&str, &str)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(query)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                path: path.to_string(),
                body: serde_json::from_str(&text).ok(),
            });
        }

        let body = serde_json::from_str(&text)
            .map_err(|e| UpstreamError::Decode(format!("GET {}: {}", path, e)))?;

        Ok(UpstreamResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PixelfedApi for PixelfedClient {
    async fn get_json(
        &self,
        path: &str,
        access_token: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        let query = request_params(params);
        let operation = format!("GET {}", path);

        tracing::debug!(path = %path, params = ?query, "Querying Pixelfed API");

        retry_transient(&operation, &self.retry_policy, || {
            self.get_once(path, access_token, &query)
        })
        .await
    }
}
