//! Client configuration

use crate::error::{ClientError, ClientResult};
use std::time::Duration;

/// Environment variable holding the API base URL
pub const ENV_BASE_URL: &str = "DASHBOARD_API_BASE_URL";
/// Environment variable holding the admin bearer token
pub const ENV_TOKEN: &str = "DASHBOARD_API_TOKEN";
/// Environment variable holding the request timeout in seconds
pub const ENV_TIMEOUT_SECS: &str = "DASHBOARD_TIMEOUT_SECS";

/// Client configuration for connecting to the order API
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL (e.g., "http://localhost:8000/api/v1")
    pub base_url: String,

    /// Admin bearer token sent with every request
    pub token: Option<String>,

    /// Request timeout in seconds (REST calls only; the event stream has none)
    pub timeout: u64,

    /// TCP connect timeout in seconds, also bounds opening the event stream
    pub connect_timeout: u64,
}

impl ClientConfig {
    /// Create a new client configuration
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: 30,
            connect_timeout: 5,
        }
    }

    /// Load configuration from environment variables
    ///
    /// `DASHBOARD_API_BASE_URL` is required; token and timeout are optional.
    pub fn from_env() -> ClientResult<Self> {
        let base_url = std::env::var(ENV_BASE_URL)
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClientError::Config(format!("{ENV_BASE_URL} must be set")))?;

        let mut config = Self::new(base_url);
        if let Some(token) = std::env::var(ENV_TOKEN).ok().filter(|s| !s.is_empty()) {
            config = config.with_token(token);
        }
        if let Ok(raw) = std::env::var(ENV_TIMEOUT_SECS) {
            let seconds = raw.parse().map_err(|_| {
                ClientError::Config(format!("{ENV_TIMEOUT_SECS} must be a number, got {raw:?}"))
            })?;
            config = config.with_timeout(seconds);
        }
        Ok(config)
    }

    /// Set the bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = seconds;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Create an HTTP client from this configuration
    pub fn build_http_client(&self) -> ClientResult<super::HttpClient> {
        super::HttpClient::new(self)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:8000/api/v1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new("http://pos.local/api")
            .with_token("secret")
            .with_timeout(10)
            .with_connect_timeout(2);

        assert_eq!(config.base_url, "http://pos.local/api");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.connect_timeout, 2);
    }

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert!(config.token.is_none());
        assert_eq!(config.timeout, 30);
    }
}
