//! Configuration management for the GA4 Reports MCP Server.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Analytics Data API base URL (stable reports and metadata).
const DEFAULT_API_BASE_URL: &str = "https://analyticsdata.googleapis.com/v1beta";

/// Analytics Data API base URL for funnel reports (alpha surface).
const DEFAULT_FUNNEL_API_BASE_URL: &str = "https://analyticsdata.googleapis.com/v1alpha";

/// Google OAuth2 token endpoint.
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// GA4 property identifier, either "123456789" or "properties/123456789".
    /// Checked per request; tools fail with a configuration error when absent.
    pub property_id: Option<String>,

    /// Pre-minted OAuth2 access token. When set, no refresh is attempted.
    pub access_token: Option<String>,

    /// OAuth2 client ID (refresh-token mode)
    pub client_id: Option<String>,

    /// OAuth2 client secret (refresh-token mode)
    pub client_secret: Option<String>,

    /// OAuth2 refresh token (refresh-token mode)
    pub refresh_token: Option<String>,

    /// Shared secret callers must present to the `call` entry point.
    pub api_secret: Option<String>,

    /// Allow callers in when no api_secret is configured. Off by default.
    #[serde(default)]
    pub allow_unauthenticated: bool,

    /// Enable debug mode for MCP message logging
    #[serde(default)]
    pub debug: bool,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Buffer before token expiration to refresh (seconds)
    #[serde(default = "default_token_buffer")]
    pub token_refresh_buffer_seconds: u64,

    /// Upper bound for any requested row limit
    #[serde(default = "default_max_rows")]
    pub max_rows: u32,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_funnel_api_base_url")]
    pub funnel_api_base_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,
}

fn default_timeout() -> u64 {
    30
}

fn default_token_buffer() -> u64 {
    60
}

fn default_max_rows() -> u32 {
    10_000
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_funnel_api_base_url() -> String {
    DEFAULT_FUNNEL_API_BASE_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

/// Treat `Some("")` and `None` alike.
fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from a JSON document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the configured property, e.g. from a CLI flag.
    pub fn with_property(mut self, property_id: Option<String>) -> Result<Self, ConfigError> {
        if property_id.is_some() {
            self.property_id = property_id;
            self.validate()?;
        }
        Ok(self)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.uses_static_token() {
            for (name, value) in [
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("refresh_token", &self.refresh_token),
            ] {
                if !present(value) {
                    return Err(ConfigError::MissingField(format!(
                        "{} (required unless access_token is set)",
                        name
                    )));
                }
            }
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "timeout_seconds must be at least 1".into(),
            ));
        }

        if self.max_rows == 0 {
            return Err(ConfigError::Invalid("max_rows must be at least 1".into()));
        }

        if let Some(property) = self.property_id.as_deref() {
            let id = property.trim().trim_start_matches("properties/");
            if !id.is_empty() && !id.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Invalid(format!(
                    "property_id '{}' must be numeric (optionally prefixed with 'properties/')",
                    property
                )));
            }
        }

        Ok(())
    }

    /// Whether a static access token is used instead of the refresh flow.
    pub fn uses_static_token(&self) -> bool {
        present(&self.access_token)
    }

    /// Resource name of the configured property ("properties/<id>"), if any.
    pub fn property_resource(&self) -> Option<String> {
        let id = self
            .property_id
            .as_deref()?
            .trim()
            .trim_start_matches("properties/");
        if id.is_empty() {
            None
        } else {
            Some(format!("properties/{}", id))
        }
    }

    /// Get timeout as Duration.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    /// Get token refresh buffer as chrono Duration.
    pub fn token_buffer(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_refresh_buffer_seconds as i64)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        property_id: Some("123456".to_string()),
        access_token: Some("test-token".to_string()),
        client_id: None,
        client_secret: None,
        refresh_token: None,
        api_secret: Some("s3cret".to_string()),
        allow_unauthenticated: false,
        debug: false,
        timeout_seconds: 30,
        token_refresh_buffer_seconds: 60,
        max_rows: 10_000,
        api_base_url: default_api_base_url(),
        funnel_api_base_url: default_funnel_api_base_url(),
        token_url: default_token_url(),
    }
}
