//! Application configuration.
//!
//! One [`AppConfig`] is constructed at process start (from a TOML file or
//! defaults) and passed by reference into the engine and gateway clients.
//! Business logic never reads ambient environment state.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration for the platform core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Public base URL used when building profile and deep-link URLs,
    /// e.g. `https://kairan.example.ac.jp`.
    pub base_url: String,
    pub push: PushConfig,
    pub preview: PreviewConfig,
}

/// Push gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Master switch; when off the engine still writes in-app rows but
    /// never contacts the gateway.
    pub enabled: bool,
    /// Gateway endpoint receiving `{recipients, title, body, url}` JSON.
    pub gateway_url: String,
    /// Bearer token for the gateway, if it requires one.
    pub api_key: Option<String>,
    /// Client-side timeout; the gateway call must never block a request
    /// indefinitely.
    pub timeout_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            gateway_url: String::new(),
            api_key: None,
            timeout_ms: 3_000,
        }
    }
}

/// Link-preview fetcher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub timeout_ms: u64,
    /// Cap on how much of the response body is scanned for meta tags.
    pub max_body_bytes: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_body_bytes: 256 * 1024,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file. Missing keys fall back to
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().display().to_string(), e.to_string()))?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push.timeout_ms)
    }

    pub fn preview_timeout(&self) -> Duration {
        Duration::from_millis(self.preview.timeout_ms)
    }
}

/// Configuration loading failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(String, String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
