//! HTTP peer client
//!
//! Talks to a remote control adapter over its REST parameter interface and
//! exposes it as a [`ParameterController`] and [`ReadinessSource`].

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::control::peer::{ParameterController, ReadinessSource};
use crate::error::{ControlError, ControlResult};

/// Default path of the readiness latch on the peer
pub const DEFAULT_READINESS_PATH: &str = "first_update";

const METADATA_ACCEPT: &str = "application/json;metadata=true";

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for an HTTP peer
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the peer adapter, e.g. `http://localhost:8888/api/0.1/fp`
    pub base_url: String,

    /// Path of the readiness latch below the base URL
    pub readiness_path: String,

    /// Request timeout
    pub timeout: Duration,

    /// Retry count for failed requests
    pub retry_count: u32,

    /// Retry delay
    pub retry_delay: Duration,
}

impl ClientConfig {
    /// Create a new client config
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            readiness_path: DEFAULT_READINESS_PATH.to_string(),
            timeout: Duration::from_secs(10),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set retry count
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Set retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set readiness path
    pub fn with_readiness_path(mut self, path: impl Into<String>) -> Self {
        self.readiness_path = path.into();
        self
    }

    /// Full URL of `path` below the base URL
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_matches('/')
        )
    }
}

// ============================================================================
// HTTP Peer
// ============================================================================

/// A remote controller reached over HTTP
pub struct HttpPeer {
    name: String,
    config: ClientConfig,
    http_client: Client,
}

impl HttpPeer {
    /// Create a new HTTP peer
    pub fn new(name: impl Into<String>, config: ClientConfig) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // Internal: request with retry. Client errors (4xx) are returned at once.
    async fn request_with_retry(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        with_metadata: bool,
    ) -> Result<Option<Value>, ClientError> {
        let url = self.config.url_for(path);
        let mut last_error = None;

        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tracing::debug!(peer = %self.name, url = %url, attempt, "Retrying request");
                tokio::time::sleep(self.config.retry_delay).await;
            }

            let mut request = self.http_client.request(method.clone(), &url);
            if with_metadata {
                request = request.header(ACCEPT, METADATA_ACCEPT);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let error = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    return read_body(response).await;
                }
                Ok(response) => ClientError::HttpError {
                    status: response.status().as_u16(),
                    message: response.text().await.unwrap_or_default(),
                },
                Err(e) => ClientError::NetworkError(e.to_string()),
            };

            if !error.is_retryable() {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| ClientError::NetworkError("Unknown error".to_string())))
    }

    fn to_control_error(&self, method: &Method, path: &str, error: ClientError) -> ControlError {
        match error {
            ClientError::HttpError { status, message } if is_client_error(status) => {
                if *method == Method::GET || status == StatusCode::NOT_FOUND.as_u16() {
                    ControlError::PathNotFound(path.to_string())
                } else {
                    ControlError::invalid_value(path, extract_message(&message))
                }
            }
            other => ControlError::PeerUnavailable(format!("{}: {}", self.name, other)),
        }
    }
}

#[async_trait]
impl ParameterController for HttpPeer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, path: &str, with_metadata: bool) -> ControlResult<Value> {
        self.request_with_retry(Method::GET, path, None, with_metadata)
            .await
            .map_err(|e| self.to_control_error(&Method::GET, path, e))?
            .ok_or_else(|| {
                ControlError::PeerUnavailable(format!("{}: empty response for '{}'", self.name, path))
            })
    }

    async fn put(&self, path: &str, value: Value) -> ControlResult<()> {
        self.request_with_retry(Method::PUT, path, Some(&value), false)
            .await
            .map_err(|e| self.to_control_error(&Method::PUT, path, e))?;
        Ok(())
    }
}

#[async_trait]
impl ReadinessSource for HttpPeer {
    async fn first_update(&self) -> ControlResult<bool> {
        let path = self.config.readiness_path.as_str();
        let value = self.get(path, false).await?;
        parse_readiness(path, &value)
    }
}

/// Interpret a readiness response: a bare boolean or `{"<key>": bool}`
pub fn parse_readiness(path: &str, value: &Value) -> ControlResult<bool> {
    let key = path
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_READINESS_PATH);

    match value {
        Value::Bool(b) => Ok(*b),
        Value::Object(map) => map
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| ControlError::invalid_value(path, format!("no boolean '{key}' field in {value}"))),
        other => Err(ControlError::invalid_value(
            path,
            format!("expected a boolean, got {other}"),
        )),
    }
}

async fn read_body(response: reqwest::Response) -> Result<Option<Value>, ClientError> {
    let text = response
        .text()
        .await
        .map_err(|e| ClientError::NetworkError(e.to_string()))?;

    if text.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| ClientError::ParseError(e.to_string()))
}

fn is_client_error(status: u16) -> bool {
    (400..500).contains(&status)
}

// Control adapters answer errors as {"error": msg}; fall back to the raw text
fn extract_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

// ============================================================================
// Client Errors
// ============================================================================

/// Client errors
#[derive(Debug, Clone)]
pub enum ClientError {
    /// Initialization error
    InitError(String),

    /// Network error
    NetworkError(String),

    /// HTTP error
    HttpError { status: u16, message: String },

    /// Parse error
    ParseError(String),
}

impl ClientError {
    /// Network failures and server errors are retried; client errors are not
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError(_) => true,
            Self::HttpError { status, .. } => *status >= 500,
            Self::InitError(_) | Self::ParseError(_) => false,
        }
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitError(msg) => write!(f, "Initialization error: {msg}"),
            Self::NetworkError(msg) => write!(f, "Network error: {msg}"),
            Self::HttpError { status, message } => {
                write!(f, "HTTP error ({status}): {message}")
            }
            Self::ParseError(msg) => write!(f, "Parse error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

// ============================================================================
// Tests
// ============================================================================
