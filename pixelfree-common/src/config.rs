//! Configuration loading and compiled defaults
//!
//! Settings are resolved per value in priority order:
//! 1. Command-line argument / environment variable (highest priority)
//! 2. TOML config file
//! 3. OS-dependent compiled default (fallback)
//!
//! A missing TOML file never prevents startup: a warning is logged and the
//! compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PIXELFREE_CONFIG";

/// Pixelfed instance used when nothing else is configured
pub const DEFAULT_INSTANCE_URL: &str = "https://pixelfed.social";

/// Compiled defaults for the current platform
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDefaults {
    pub instance_url: String,
    pub port: u16,
    pub token_file: PathBuf,
    pub log_level: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            instance_url: DEFAULT_INSTANCE_URL.to_string(),
            port: 3000,
            token_file: default_data_dir().join("token.json"),
            log_level: "info".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 400,
        }
    }
}

/// `[logging]` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level directive (e.g. "info", "debug")
    #[serde(default)]
    pub level: Option<String>,
}

/// `[upstream]` table: transport tuning for the Pixelfed API client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Per-request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Retries after the first attempt for 429/5xx responses
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Base delay for exponential backoff
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
}

/// Contents of `pixelfree.toml`
///
/// Every field is optional so that older or partial files keep loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the Pixelfed/Mastodon-compatible instance
    #[serde(default)]
    pub instance_url: Option<String>,
    /// HTTP listen port
    #[serde(default)]
    pub port: Option<u16>,
    /// Location of the OAuth token set written by the login flow
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// OAuth client id (used for token refresh)
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret (used for token refresh)
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Fixed bearer token; takes the place of the token file when set
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// A configured string counts only when it is non-empty after trimming
pub fn is_set(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Default config file location: `<config dir>/pixelfree/pixelfree.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pixelfree").join("pixelfree.toml"))
}

/// Pick the config file path
///
/// **Priority:** explicit argument → `PIXELFREE_CONFIG` → platform default
pub fn config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if is_set(&path) {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path()
}

/// Load a TOML config file
///
/// A missing file yields `TomlConfig::default()` with a warning. An unreadable
/// file is an `Io` error; malformed TOML is a `Config` error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}; using compiled defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// OS-dependent data directory for PixelFree state (token file)
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/pixelfree
        dirs::data_local_dir()
            .map(|d| d.join("pixelfree"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/pixelfree"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/pixelfree
        dirs::data_dir()
            .map(|d| d.join("pixelfree"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/pixelfree"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\pixelfree
        dirs::data_local_dir()
            .map(|d| d.join("pixelfree"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\pixelfree"))
    } else {
        PathBuf::from("./pixelfree_data")
    }
}
