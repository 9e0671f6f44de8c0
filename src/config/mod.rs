//! Configuration management for framectl
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::client::{ClientConfig, DEFAULT_READINESS_PATH};
use crate::control::ControllerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Controller configuration
    pub controller: ControllerConfig,

    /// Peer adapter endpoints
    pub peers: PeerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Endpoints of the peer adapter and the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Base URL of the peer adapter
    pub url: String,

    /// Base URL receiving worker configuration (defaults to `url`)
    pub workers_url: Option<String>,

    /// Readiness latch path below `url`
    pub readiness_path: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retries after a failed request
    pub retry_count: u32,

    /// Delay between retries in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://127.0.0.1:8888/api/0.1/fp"),
            workers_url: None,
            readiness_path: DEFAULT_READINESS_PATH.to_string(),
            timeout_secs: 10,
            retry_count: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl PeerConfig {
    /// Client settings for the peer endpoint
    pub fn client_config(&self) -> ClientConfig {
        self.client_config_for(&self.url)
    }

    /// Client settings for the worker endpoint
    pub fn workers_client_config(&self) -> ClientConfig {
        self.client_config_for(self.workers_url.as_deref().unwrap_or(&self.url))
    }

    /// Whether workers are reached through a different endpoint than the peer
    pub fn has_separate_workers(&self) -> bool {
        self.workers_url.as_deref().is_some_and(|url| url != self.url)
    }

    fn client_config_for(&self, url: &str) -> ClientConfig {
        ClientConfig::new(url)
            .with_readiness_path(self.readiness_path.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_retry_count(self.retry_count)
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let mut controller = defaults.controller;

        if let Ok(name) = std::env::var("FRAMECTL_NAME") {
            controller.name = name;
        }
        if let Ok(kind) = std::env::var("FRAMECTL_KIND") {
            controller.kind = kind;
        }
        if let Ok(adapter) = std::env::var("FRAMECTL_PEER_ADAPTER") {
            controller.peer_adapter = adapter;
        }
        if let Some(ms) = parse_env::<u64>("FRAMECTL_POLL_INTERVAL_MS")? {
            controller.poll_interval_ms = ms;
        }
        if let Some(secs) = parse_env::<u64>("FRAMECTL_READINESS_TIMEOUT_SECS")? {
            controller.readiness_timeout_secs = Some(secs);
        }
        if let Ok(policy) = std::env::var("FRAMECTL_FAILURE_POLICY") {
            controller.failure_policy = policy
                .parse()
                .context("Invalid FRAMECTL_FAILURE_POLICY")?;
        }
        if let Ok(path) = std::env::var("FRAMECTL_COUNT_PATH") {
            controller.count_path = path;
        }

        let mut peers = defaults.peers;
        if let Ok(url) = std::env::var("FRAMECTL_PEER_URL") {
            peers.url = url;
        }
        peers.workers_url = std::env::var("FRAMECTL_WORKERS_URL").ok();
        if let Ok(path) = std::env::var("FRAMECTL_READINESS_PATH") {
            peers.readiness_path = path;
        }
        if let Some(secs) = parse_env::<u64>("FRAMECTL_REQUEST_TIMEOUT")? {
            peers.timeout_secs = secs;
        }
        if let Some(count) = parse_env::<u32>("FRAMECTL_RETRY_COUNT")? {
            peers.retry_count = count;
        }
        if let Some(ms) = parse_env::<u64>("FRAMECTL_RETRY_DELAY_MS")? {
            peers.retry_delay_ms = ms;
        }

        let log_level =
            std::env::var("FRAMECTL_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));
        let log_format =
            std::env::var("FRAMECTL_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            controller,
            peers,
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.controller
            .validate()
            .context("Invalid controller configuration")?;

        if self.peers.url.trim().is_empty() {
            anyhow::bail!("peers.url must not be empty");
        }

        if self.peers.workers_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            anyhow::bail!("peers.workers_url must not be empty when set");
        }

        if self.peers.timeout_secs == 0 {
            anyhow::bail!("peers.timeout_secs must be greater than 0");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.peers.timeout_secs)
    }
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid value for {key}: {raw}")),
        Err(_) => Ok(None),
    }
}
