//! Server configuration.
//!
//! Read from a JSON file; every field is optional and falls back to its default:
//!
//! ```json
//! {
//!   "address": "0.0.0.0:8080",
//!   "idle_timeout_secs": 15,
//!   "pipeline_capacity": 8,
//!   "websocket_path": "/ws",
//!   "websocket_subprotocol": "echo",
//!   "assets_dir": "assets",
//!   "tls": { "cert": "cert.pem", "key": "key.pem" }
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use syncaide_http::deadline::IDLE_WINDOW;
use syncaide_http::pipeline::PIPELINE_CAPACITY;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub address: String,
    pub idle_timeout_secs: u64,
    pub pipeline_capacity: usize,
    /// Upgrade path of the echo WebSocket.
    pub websocket_path: String,
    /// Sub-protocol the echo WebSocket confirms when a client offers it.
    pub websocket_subprotocol: Option<String>,
    pub assets_dir: PathBuf,
    /// TLS is enabled exactly when this is set.
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// PEM certificate chain.
    pub cert: PathBuf,
    /// PEM private key.
    pub key: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

impl ConfigError {
    fn invalid<S: ToString>(reason: S) -> Self {
        Self::Invalid { reason: reason.to_string() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_owned(),
            idle_timeout_secs: IDLE_WINDOW.as_secs(),
            pipeline_capacity: PIPELINE_CAPACITY,
            websocket_path: "/ws".to_owned(),
            websocket_subprotocol: None,
            assets_dir: PathBuf::from("assets"),
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::invalid("idle_timeout_secs must be positive"));
        }
        if self.pipeline_capacity == 0 {
            return Err(ConfigError::invalid("pipeline_capacity must be positive"));
        }
        if !self.websocket_path.starts_with('/') {
            return Err(ConfigError::invalid(format!("websocket_path {:?} must start with '/'", self.websocket_path)));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
