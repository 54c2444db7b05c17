//! Access token providers
//!
//! The aggregator only needs "the current bearer token". OAuth login lives
//! elsewhere; this module reads what the login flow stored and refreshes it
//! when it is about to expire.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Tokens this close to expiry are refreshed before use
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Access token expired and cannot be refreshed")]
    Expired,

    #[error("Token refresh failed ({status}): {body}")]
    RefreshFailed { status: u16, body: String },

    #[error("Token store error: {0}")]
    TokenStore(String),
}

/// Source of a currently valid bearer token
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// Fixed token from configuration
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

#[async_trait]
impl AccessTokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        self.token.clone().ok_or(AuthError::NotAuthenticated)
    }
}

/// OAuth token set as stored by the login flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Epoch seconds
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenSet {
    /// `None` when expiry is unknown or does not fit in an i64
    pub fn expires_at(&self) -> Option<i64> {
        self.created_at?.checked_add(self.expires_in?)
    }

    /// A token without expiry information is treated as valid
    pub fn is_fresh(&self, now: i64) -> bool {
        match self.expires_at() {
            Some(expires_at) => now < expires_at.saturating_sub(EXPIRY_SKEW_SECS),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Token set persisted as JSON on disk, refreshed on demand
pub struct FileTokenProvider {
    path: PathBuf,
    instance_url: String,
    credentials: Option<OAuthCredentials>,
    http_client: reqwest::Client,
    refresh_lock: Mutex<()>,
}

impl FileTokenProvider {
    pub fn new(
        path: impl Into<PathBuf>,
        instance_url: impl Into<String>,
        credentials: Option<OAuthCredentials>,
    ) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::TokenStore(e.to_string()))?;

        Ok(Self {
            path: path.into(),
            instance_url: instance_url.into().trim_end_matches('/').to_string(),
            credentials,
            http_client,
            refresh_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_token(&self) -> Result<TokenSet, AuthError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::NotAuthenticated)
            }
            Err(e) => return Err(AuthError::TokenStore(e.to_string())),
        };

        serde_json::from_str(&content).map_err(|e| {
            AuthError::TokenStore(format!("Parse {} failed: {}", self.path.display(), e))
        })
    }

    async fn write_token(&self, tokens: &TokenSet) -> Result<(), AuthError> {
        let json = serde_json::to_string_pretty(tokens)
            .map_err(|e| AuthError::TokenStore(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| AuthError::TokenStore(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, permissions)
                .await
                .map_err(|e| AuthError::TokenStore(e.to_string()))?;
        }

        Ok(())
    }

    async fn refresh(&self, stale: &TokenSet) -> Result<TokenSet, AuthError> {
        let (Some(credentials), Some(refresh_token)) =
            (self.credentials.as_ref(), stale.refresh_token.as_deref())
        else {
            return Err(AuthError::Expired);
        };

        let url = format!("{}/oauth/token", self.instance_url);
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("scope", "read"),
        ];

        tracing::info!("Refreshing Pixelfed access token");

        let response = self
            .http_client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::TokenStore(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Token refresh rejected; discarding stored token");
            if let Err(e) = tokio::fs::remove_file(&self.path).await {
                tracing::debug!(error = %e, "Could not remove stale token file");
            }
            return Err(AuthError::RefreshFailed {
                status: status.as_u16(),
                body: text,
            });
        }

        let mut fresh: TokenSet = serde_json::from_str(&text)
            .map_err(|e| AuthError::TokenStore(format!("Parse refresh response failed: {}", e)))?;
        fresh.created_at = Some(Utc::now().timestamp());
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = stale.refresh_token.clone();
        }

        self.write_token(&fresh).await?;
        Ok(fresh)
    }
}

#[async_trait]
impl AccessTokenProvider for FileTokenProvider {
    async fn access_token(&self) -> Result<String, AuthError> {
        let _guard = self.refresh_lock.lock().await;

        let tokens = self.read_token().await?;
        if tokens.is_fresh(Utc::now().timestamp()) {
            return Ok(tokens.access_token);
        }

        Ok(self.refresh(&tokens).await?.access_token)
    }
}
