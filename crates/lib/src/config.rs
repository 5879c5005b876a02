//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.gatekeep/config.json`) and environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Feed connection used by the review console.
    #[serde(default)]
    pub feed: FeedConfig,

    /// Stub feed server settings (`gatekeep stub-feed`).
    #[serde(default)]
    pub stub: StubConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfig {
    /// WebSocket URL of the feed (default "ws://localhost:8080/ws"). Overridden by GATEKEEP_FEED_URL env.
    #[serde(default = "default_feed_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StubConfig {
    /// Port for the stub feed (default 8080, matching the default feed URL).
    #[serde(default = "default_stub_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_stub_bind")]
    pub bind: String,
}

fn default_feed_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_stub_port() -> u16 {
    8080
}

fn default_stub_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
        }
    }
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            port: default_stub_port(),
            bind: default_stub_bind(),
        }
    }
}

/// Resolve the feed URL: env GATEKEEP_FEED_URL overrides config.
pub fn resolve_feed_url(config: &Config) -> String {
    std::env::var("GATEKEEP_FEED_URL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| config.feed.url.trim().to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("GATEKEEP_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".gatekeep").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or GATEKEEP_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_console_at_stub() {
        let c = Config::default();
        assert_eq!(c.feed.url, "ws://localhost:8080/ws");
        assert_eq!(c.stub.port, 8080);
        assert_eq!(c.stub.bind, "127.0.0.1");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let c: Config = serde_json::from_str(r#"{ "stub": { "port": 9001 } }"#).expect("parse");
        assert_eq!(c.stub.port, 9001);
        assert_eq!(c.stub.bind, "127.0.0.1");
        assert_eq!(c.feed.url, "ws://localhost:8080/ws");
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir()
            .join(format!("gatekeep-missing-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let (config, used) = load_config(Some(path.clone())).expect("load");
        assert_eq!(used, path);
        assert_eq!(config.feed.url, "ws://localhost:8080/ws");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("gatekeep-bad-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("config.json");
        std::fs::write(&path, b"{ not json").expect("write");
        assert!(load_config(Some(path)).is_err());
    }
}
