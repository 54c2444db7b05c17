//! Configuration resolution for pixelfree-agg
//!
//! Provides per-setting resolution with command line / environment → TOML →
//! compiled default priority.

use crate::services::{
    AccessTokenProvider, AuthError, FileTokenProvider, OAuthCredentials, StaticTokenProvider,
};
use crate::utils::RetryPolicy;
use pixelfree_common::config::{is_set, CompiledDefaults, TomlConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Values supplied on the command line or through `PIXELFREE_*` variables
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub instance_url: Option<String>,
    pub port: Option<u16>,
    pub token_file: Option<PathBuf>,
    pub access_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub log_level: Option<String>,
}

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub instance_url: String,
    pub port: u16,
    pub token_file: PathBuf,
    pub access_token: Option<String>,
    pub credentials: Option<OAuthCredentials>,
    pub log_level: String,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
}

/// Pick the highest-priority value, logging where it came from
fn pick<T>(name: &str, cli: Option<T>, toml: Option<T>) -> Option<T> {
    match (cli, toml) {
        (Some(value), Some(_)) => {
            warn!(
                "{} found in multiple sources: command line/environment, TOML. Using command line/environment (highest priority).",
                name
            );
            Some(value)
        }
        (Some(value), None) => {
            debug!("{} loaded from command line/environment", name);
            Some(value)
        }
        (None, Some(value)) => {
            debug!("{} loaded from TOML config", name);
            Some(value)
        }
        (None, None) => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| is_set(v))
}

impl ServiceConfig {
    /// Resolve every setting from overrides, TOML, then compiled defaults
    pub fn resolve(cli: CliOverrides, toml: &TomlConfig) -> Self {
        let defaults = CompiledDefaults::for_current_platform();

        let instance_url = pick(
            "instance_url",
            non_blank(cli.instance_url),
            non_blank(toml.instance_url.clone()),
        )
        .unwrap_or(defaults.instance_url);
        let port = pick("port", cli.port, toml.port).unwrap_or(defaults.port);
        let token_file = pick("token_file", cli.token_file, toml.token_file.clone())
            .unwrap_or(defaults.token_file);
        let access_token = pick(
            "access_token",
            non_blank(cli.access_token),
            non_blank(toml.access_token.clone()),
        );
        let client_id = pick(
            "client_id",
            non_blank(cli.client_id),
            non_blank(toml.client_id.clone()),
        );
        let client_secret = pick(
            "client_secret",
            non_blank(cli.client_secret),
            non_blank(toml.client_secret.clone()),
        );
        let log_level = pick(
            "log_level",
            non_blank(cli.log_level),
            non_blank(toml.logging.level.clone()),
        )
        .unwrap_or(defaults.log_level);

        let credentials = match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => Some(OAuthCredentials {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        let upstream = &toml.upstream;
        let timeout =
            Duration::from_secs(upstream.timeout_secs.unwrap_or(defaults.timeout_secs));
        let retry_policy = RetryPolicy::new(
            upstream.max_retries.unwrap_or(defaults.max_retries),
            Duration::from_millis(upstream.base_delay_ms.unwrap_or(defaults.base_delay_ms)),
        );

        Self {
            instance_url: instance_url.trim_end_matches('/').to_string(),
            port,
            token_file,
            access_token,
            credentials,
            log_level,
            timeout,
            retry_policy,
        }
    }

    /// A fixed token wins over the token file
    pub fn token_provider(&self) -> Result<Arc<dyn AccessTokenProvider>, AuthError> {
        if let Some(token) = &self.access_token {
            debug!("Using configured static access token");
            return Ok(Arc::new(StaticTokenProvider::new(Some(token.clone()))));
        }

        if self.credentials.is_none() {
            warn!("OAuth client credentials not configured; expired tokens cannot be refreshed");
        }

        Ok(Arc::new(FileTokenProvider::new(
            self.token_file.clone(),
            self.instance_url.clone(),
            self.credentials.clone(),
        )?))
    }
}
