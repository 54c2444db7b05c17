//! Account resolver
//!
//! Maps user-supplied handles (`alice`, `@alice`, `alice@host.tld`,
//! `https://host.tld/@alice`) to account ids on the configured instance.
//!
//! Resolution tries, in order, until one yields an id:
//! 1. `/api/v2/search` with `resolve=true` (federated lookup, local or remote)
//! 2. `/api/v1/accounts/lookup` (only for handles without a domain)
//! 3. `/api/v1/accounts/search` (local search, first match)
//!
//! A failed or empty step falls through to the next one. A malformed handle
//! is rejected before any network call.

use crate::models::upstream::{id_from_value, SearchResults};
use crate::services::token_provider::{AccessTokenProvider, AuthError};
use crate::services::upstream_client::{PixelfedApi, UpstreamError};
use futures::future::join_all;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum ResolutionError {
    /// Local validation failure; no network call was made
    #[error("Bad acct \"{handle}\": {reason}")]
    MalformedHandle { handle: String, reason: String },

    /// Every resolution step came back empty or failed
    #[error("Unable to resolve acct \"{handle}\" to an account ID")]
    Unresolved { handle: String },

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ResolutionError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ResolutionError::MalformedHandle { .. } => "malformed_handle",
            ResolutionError::Unresolved { .. } => "unresolved",
            ResolutionError::Auth(_) => "auth_required",
        }
    }
}

/// Normalize a raw handle into `name` or `name@domain`
pub fn normalize_handle(raw: &str) -> Result<String, ResolutionError> {
    let malformed = |reason: &str| ResolutionError::MalformedHandle {
        handle: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    let mut handle = trimmed.strip_prefix('@').unwrap_or(trimmed).to_string();

    let lower = handle.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        handle = handle_from_profile_url(&handle)
            .ok_or_else(|| malformed("profile URL must look like https://host.tld/@name"))?;
    }

    if handle.is_empty() {
        return Err(malformed("handle is empty"));
    }

    if let Some((name, domain)) = handle.split_once('@') {
        if name.is_empty() {
            return Err(malformed("user name is empty"));
        }
        if domain.is_empty() || !domain.contains('.') || domain.contains('@') {
            return Err(malformed(
                "domain appears incomplete; include the full domain, e.g. \"@user@host.tld\"",
            ));
        }
    }

    Ok(handle)
}

/// `https://host.tld/@name/...` → `name@host.tld`
fn handle_from_profile_url(raw: &str) -> Option<String> {
    let url = reqwest::Url::parse(raw).ok()?;
    let host = url.host_str()?;
    let name = url
        .path_segments()?
        .find_map(|segment| segment.strip_prefix('@').filter(|n| !n.is_empty()))?;
    Some(format!("{}@{}", name, host))
}

/// Outcome of one resolution step
#[derive(Debug)]
enum StepOutcome {
    Found(String),
    NoMatch,
    Failed(UpstreamError),
}

/// Process-scoped normalized-handle → account-id cache
///
/// Entries are never evicted; resolving the same handle twice always yields
/// the same id, so concurrent writers may race harmlessly.
#[derive(Clone, Default)]
pub struct ResolutionCache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, handle: &str) -> Option<String> {
        self.entries.read().await.get(handle).cloned()
    }

    pub async fn insert(&self, handle: String, account_id: String) {
        self.entries.write().await.insert(handle, account_id);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// A handle that could not be resolved, kept for reporting
#[derive(Debug)]
pub struct HandleFailure {
    /// Handle as supplied by the caller
    pub handle: String,
    pub error: ResolutionError,
}

/// Result of resolving a batch of handles
#[derive(Debug, Default)]
pub struct BatchResolution {
    /// De-duplicated ids, in first-seen order
    pub account_ids: Vec<String>,
    pub failures: Vec<HandleFailure>,
}

pub struct AccountResolver {
    api: Arc<dyn PixelfedApi>,
    tokens: Arc<dyn AccessTokenProvider>,
    cache: ResolutionCache,
}

impl AccountResolver {
    pub fn new(api: Arc<dyn PixelfedApi>, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self::with_cache(api, tokens, ResolutionCache::new())
    }

    pub fn with_cache(
        api: Arc<dyn PixelfedApi>,
        tokens: Arc<dyn AccessTokenProvider>,
        cache: ResolutionCache,
    ) -> Self {
        Self { api, tokens, cache }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Resolve one handle to an account id
    pub async fn resolve_handle(&self, raw: &str) -> Result<String, ResolutionError> {
        let normalized = normalize_handle(raw)?;

        if let Some(id) = self.cache.get(&normalized).await {
            tracing::debug!(handle = %normalized, account_id = %id, "Resolution cache hit");
            return Ok(id);
        }

        let token = self.tokens.access_token().await?;
        self.resolve_uncached(raw, &normalized, &token).await
    }

    /// Resolve many handles; individual failures are collected, not raised
    ///
    /// Only an authentication failure aborts the batch, since no handle could
    /// be resolved without a token.
    pub async fn resolve_many<S: AsRef<str>>(
        &self,
        handles: &[S],
    ) -> Result<BatchResolution, AuthError> {
        let mut batch = BatchResolution::default();
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        let mut misses = Vec::new();

        for raw in handles.iter().map(|h| h.as_ref().trim()).filter(|h| !h.is_empty()) {
            let normalized = match normalize_handle(raw) {
                Ok(normalized) => normalized,
                Err(error) => {
                    tracing::info!(handle = %raw, error = %error, "Rejected malformed handle");
                    batch.failures.push(HandleFailure {
                        handle: raw.to_string(),
                        error,
                    });
                    continue;
                }
            };

            if !seen.insert(normalized.clone()) {
                continue;
            }

            match self.cache.get(&normalized).await {
                Some(id) => resolved.push(id),
                None => misses.push((raw.to_string(), normalized)),
            }
        }

        if !misses.is_empty() {
            let token = self.tokens.access_token().await?;
            let outcomes = join_all(
                misses
                    .iter()
                    .map(|(raw, normalized)| self.resolve_uncached(raw, normalized, &token)),
            )
            .await;

            for ((raw, _), outcome) in misses.into_iter().zip(outcomes) {
                match outcome {
                    Ok(id) => resolved.push(id),
                    Err(ResolutionError::Auth(e)) => return Err(e),
                    Err(error) => batch.failures.push(HandleFailure { handle: raw, error }),
                }
            }
        }

        let mut unique = HashSet::new();
        batch.account_ids = resolved
            .into_iter()
            .filter(|id| unique.insert(id.clone()))
            .collect();

        tracing::debug!(
            resolved = batch.account_ids.len(),
            failed = batch.failures.len(),
            "Resolved handle batch"
        );

        Ok(batch)
    }

    async fn resolve_uncached(
        &self,
        raw: &str,
        normalized: &str,
        token: &str,
    ) -> Result<String, ResolutionError> {
        let outcome = self.search_remote(normalized, token).await;
        if let Some(id) = self.accept("search", normalized, outcome).await {
            return Ok(id);
        }

        if !normalized.contains('@') {
            let outcome = self.lookup_local(normalized, token).await;
            if let Some(id) = self.accept("lookup", normalized, outcome).await {
                return Ok(id);
            }
        }

        let outcome = self.search_local(normalized, token).await;
        if let Some(id) = self.accept("account_search", normalized, outcome).await {
            return Ok(id);
        }

        tracing::info!(handle = %normalized, "All resolution steps exhausted");
        Err(ResolutionError::Unresolved {
            handle: raw.to_string(),
        })
    }

    /// Cache and return a found id; log and swallow anything else
    async fn accept(&self, step: &str, handle: &str, outcome: StepOutcome) -> Option<String> {
        match outcome {
            StepOutcome::Found(id) => {
                tracing::info!(handle = %handle, account_id = %id, step, "Resolved handle");
                self.cache.insert(handle.to_string(), id.clone()).await;
                Some(id)
            }
            StepOutcome::NoMatch => {
                tracing::debug!(handle = %handle, step, "No match, trying next step");
                None
            }
            StepOutcome::Failed(e) => {
                tracing::debug!(handle = %handle, step, error = %e, "Step failed, trying next step");
                None
            }
        }
    }

    /// GET /api/v2/search?q=&resolve=true&type=accounts&limit=1
    async fn search_remote(&self, handle: &str, token: &str) -> StepOutcome {
        let params = [
            ("q", Some(handle.to_string())),
            ("resolve", Some("true".to_string())),
            ("type", Some("accounts".to_string())),
            ("limit", Some("1".to_string())),
        ];
        match self.api.get_json("/api/v2/search", token, &params).await {
            Ok(response) => serde_json::from_value::<SearchResults>(response.body)
                .ok()
                .and_then(|results| results.accounts.into_iter().find_map(|a| a.id))
                .map_or(StepOutcome::NoMatch, StepOutcome::Found),
            Err(e) => StepOutcome::Failed(e),
        }
    }

    /// GET /api/v1/accounts/lookup?acct=
    async fn lookup_local(&self, handle: &str, token: &str) -> StepOutcome {
        let params = [("acct", Some(handle.to_string()))];
        match self.api.get_json("/api/v1/accounts/lookup", token, &params).await {
            Ok(response) => response
                .body
                .get("id")
                .and_then(id_from_value)
                .map_or(StepOutcome::NoMatch, StepOutcome::Found),
            Err(e) => StepOutcome::Failed(e),
        }
    }

    /// GET /api/v1/accounts/search?q=&limit=1
    async fn search_local(&self, handle: &str, token: &str) -> StepOutcome {
        let params = [
            ("q", Some(handle.to_string())),
            ("limit", Some("1".to_string())),
        ];
        match self.api.get_json("/api/v1/accounts/search", token, &params).await {
            Ok(response) => response
                .body
                .as_array()
                .and_then(|list| list.first())
                .and_then(|first: &Value| first.get("id"))
                .and_then(id_from_value)
                .map_or(StepOutcome::NoMatch, StepOutcome::Found),
            Err(e) => StepOutcome::Failed(e),
        }
    }
}
