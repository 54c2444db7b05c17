//! Unit tests for configuration loading and graceful degradation
//!
//! - Missing TOML files SHALL NOT cause termination
//! - Partial TOML files load with absent fields left unset
//! - Malformed TOML is reported as a configuration error
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate PIXELFREE_CONFIG are marked with #[serial].

use pixelfree_common::config::{
    config_path, load_toml_config, LoggingConfig, TomlConfig, UpstreamConfig, CONFIG_ENV_VAR,
};
use pixelfree_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.toml");

    let config = load_toml_config(&path).expect("missing file must not be an error");
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_full_file_parses_all_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pixelfree.toml");
    std::fs::write(
        &path,
        r#"
instance_url = "https://pixelfed.example"
port = 8080
token_file = "/tmp/pf-token.json"
client_id = "cid"
client_secret = "secret"

[logging]
level = "debug"

[upstream]
timeout_secs = 5
max_retries = 1
base_delay_ms = 50
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.instance_url.as_deref(), Some("https://pixelfed.example"));
    assert_eq!(config.port, Some(8080));
    assert_eq!(config.token_file, Some(PathBuf::from("/tmp/pf-token.json")));
    assert_eq!(config.client_id.as_deref(), Some("cid"));
    assert_eq!(config.access_token, None);
    assert_eq!(
        config.logging,
        LoggingConfig {
            level: Some("debug".to_string())
        }
    );
    assert_eq!(
        config.upstream,
        UpstreamConfig {
            timeout_secs: Some(5),
            max_retries: Some(1),
            base_delay_ms: Some(50),
        }
    );
}

#[test]
fn test_partial_file_leaves_rest_unset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pixelfree.toml");
    std::fs::write(&path, "access_token = \"abc\"\n").unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.access_token.as_deref(), Some("abc"));
    assert!(config.instance_url.is_none());
    assert!(config.logging.level.is_none());
    assert!(config.upstream.max_retries.is_none());
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pixelfree.toml");
    std::fs::write(&path, "port = \"not a number\"\n[[[").unwrap();

    match load_toml_config(&path) {
        Err(Error::Config(msg)) => assert!(msg.contains("Parse TOML failed")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_unreadable_path_is_io_error() {
    // A directory exists but cannot be read as a file
    let dir = tempfile::tempdir().unwrap();

    match load_toml_config(dir.path()) {
        Err(Error::Io(_)) => {}
        other => panic!("expected io error, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_env_var_selects_config_file() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/pixelfree-env.toml");

    assert_eq!(config_path(None), Some(PathBuf::from("/tmp/pixelfree-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");

    let path = config_path(None);
    assert_ne!(path, Some(PathBuf::from("   ")));

    env::remove_var(CONFIG_ENV_VAR);
}
