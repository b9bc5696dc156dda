//! Configuration loaded from a TOML file.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working local setup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::redirect::MAX_REDIRECTS;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g. "127.0.0.1:8080").
    pub bind_address: String,

    /// Seconds a connection may sit without sending a byte.
    pub idle_timeout_secs: u64,

    /// The single file behind `/image`.
    pub image_path: PathBuf,

    /// Answer `If-None-Match` / `If-Modified-Since` with 304.
    pub conditional_get: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            idle_timeout_secs: 300,
            image_path: PathBuf::from("server/image.png"),
            conditional_get: true,
        }
    }
}

impl ServerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Server to connect to, `host:port`.
    pub address: String,

    pub idle_timeout_secs: u64,

    pub max_redirects: usize,

    /// Where received PNG bodies are written. Unset disables saving.
    pub save_dir: Option<PathBuf>,

    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            idle_timeout_secs: 30,
            max_redirects: MAX_REDIRECTS,
            save_dir: Some(PathBuf::from("client")),
            user_agent: crate::client::USER_AGENT_NAME.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
