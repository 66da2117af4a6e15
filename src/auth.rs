//! OAuth2 access tokens for the Analytics Data API.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::AuthError;

/// Token endpoint response for the refresh-token grant.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Cached token with expiration tracking.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Check if token is expired (with buffer).
    fn is_expired(&self, buffer: Duration) -> bool {
        Utc::now() + buffer >= self.expires_at
    }
}

/// OAuth2 client for the Analytics Data API.
/// Also supports a static, pre-minted access token.
#[derive(Clone)]
pub struct OAuth2Client {
    config: Config,
    http_client: Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl OAuth2Client {
    /// Create a new OAuth2 client.
    pub fn new(config: Config) -> Result<Self, AuthError> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AuthError::HttpClientInit(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Get a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> Result<String, AuthError> {
        if self.config.uses_static_token() {
            return self.config.access_token.clone().ok_or(AuthError::NoToken);
        }

        {
            let cache = self.token_cache.read().await;
            if let Some(ref cached) = *cache {
                if !cached.is_expired(self.config.token_buffer()) {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        self.fetch_token().await
    }

    /// Exchange the refresh token for a new access token.
    async fn fetch_token(&self) -> Result<String, AuthError> {
        let config = &self.config;
        let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
            config.refresh_token.as_deref(),
        ) else {
            return Err(AuthError::NoToken);
        };

        let credentials = format!("{}:{}", client_id, client_secret);
        let auth_header = format!("Basic {}", BASE64.encode(credentials.as_bytes()));
        let body = format!(
            "grant_type=refresh_token&refresh_token={}",
            urlencoding::encode(refresh_token)
        );

        tracing::debug!(token_url = %self.config.token_url, "Refreshing access token");

        let response = self
            .http_client
            .post(&self.config.token_url)
            .header("Authorization", &auth_header)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Token request failed");
            return Err(AuthError::TokenRequestFailed { status, body });
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            AuthError::TokenParse(format!("Failed to parse token response: {}", e))
        })?;

        let expires_at = Utc::now() + Duration::seconds(token_response.expires_in);
        tracing::debug!(
            expires_at = %expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
            "Access token acquired"
        );

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                access_token: token_response.access_token.clone(),
                expires_at,
            });
        }

        Ok(token_response.access_token)
    }
}

impl std::fmt::Debug for OAuth2Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.config.uses_static_token() {
            "static"
        } else {
            "refresh_token"
        };
        f.debug_struct("OAuth2Client").field("mode", &mode).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn test_cached_token_expiry_uses_buffer() {
        let token = CachedToken {
            access_token: "t".to_string(),
            expires_at: Utc::now() + Duration::seconds(30),
        };
        assert!(token.is_expired(Duration::seconds(60)));
        assert!(!token.is_expired(Duration::seconds(5)));
    }

    #[tokio::test]
    async fn test_static_token_returned_without_network() {
        let client = OAuth2Client::new(test_config()).unwrap();
        assert_eq!(client.get_token().await.unwrap(), "test-token");
    }

    #[test]
    fn test_debug_hides_credentials() {
        let client = OAuth2Client::new(test_config()).unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("static"));
        assert!(!debug.contains("test-token"));
    }
}
