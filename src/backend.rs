//! Google Analytics Data API client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::{
    MetadataResponse, RunFunnelReportRequest, RunFunnelReportResponse, RunReportRequest,
    RunReportResponse,
};
use crate::auth::OAuth2Client;
use crate::config::Config;
use crate::debug::DebugLogger;
use crate::error::ApiError;

/// The analytics query service, as seen by the report tools.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    /// Run a core report for the configured property.
    async fn run_report(&self, request: &RunReportRequest) -> Result<RunReportResponse, ApiError>;

    /// Fetch the dimension and metric catalog of the configured property.
    async fn get_metadata(&self) -> Result<MetadataResponse, ApiError>;

    /// Run a funnel report for the configured property.
    async fn run_funnel_report(
        &self,
        request: &RunFunnelReportRequest,
    ) -> Result<RunFunnelReportResponse, ApiError>;
}

/// Google API error envelope.
#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// HTTP client for the Analytics Data API.
#[derive(Clone)]
pub struct DataApiClient {
    base_url: String,
    funnel_base_url: String,
    property: Option<String>,
    http_client: Client,
    auth_client: OAuth2Client,
    debug: Arc<DebugLogger>,
}

impl DataApiClient {
    /// Create a new Data API client.
    pub fn new(
        config: &Config,
        auth_client: OAuth2Client,
        debug: Arc<DebugLogger>,
    ) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::HttpClientInit(e.to_string()))?;

        Ok(Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            funnel_base_url: config.funnel_api_base_url.trim_end_matches('/').to_string(),
            property: config.property_resource(),
            http_client,
            auth_client,
            debug,
        })
    }

    /// Resource name of the configured property, checked before any request.
    fn property(&self) -> Result<String, ApiError> {
        let property = self.property.as_deref().ok_or(ApiError::MissingProperty)?;
        Ok(property
            .split('/')
            .map(|part| urlencoding::encode(part).into_owned())
            .collect::<Vec<_>>()
            .join("/"))
    }

    /// Execute GET request.
    async fn execute_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        self.debug.log_api_request("GET", url, None);

        let token = self.auth_client.get_token().await?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Execute POST request.
    async fn execute_post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        if let Ok(json) = serde_json::to_value(body) {
            self.debug.log_api_request("POST", url, Some(&json));
        }

        let token = self.auth_client.get_token().await?;

        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle HTTP response and parse JSON.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        self.debug.log_api_response(status.as_u16(), &body);

        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            tracing::warn!(%status, "Analytics Data API returned an error");
            Err(parse_error_response(status, &body))
        }
    }
}

/// Map an error body onto `ApiError`, preferring the structured Google shape.
fn parse_error_response(status: StatusCode, body: &str) -> ApiError {
    match serde_json::from_str::<GoogleErrorResponse>(body) {
        Ok(error) => ApiError::Google {
            status,
            code: error
                .error
                .status
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: error.error.message,
        },
        Err(_) => ApiError::HttpError {
            status,
            body: body.to_string(),
        },
    }
}

#[async_trait]
impl AnalyticsBackend for DataApiClient {
    async fn run_report(&self, request: &RunReportRequest) -> Result<RunReportResponse, ApiError> {
        let url = format!("{}/{}:runReport", self.base_url, self.property()?);
        self.execute_post(&url, request).await
    }

    async fn get_metadata(&self) -> Result<MetadataResponse, ApiError> {
        let url = format!("{}/{}/metadata", self.base_url, self.property()?);
        self.execute_get(&url).await
    }

    async fn run_funnel_report(
        &self,
        request: &RunFunnelReportRequest,
    ) -> Result<RunFunnelReportResponse, ApiError> {
        let url = format!("{}/{}:runFunnelReport", self.funnel_base_url, self.property()?);
        self.execute_post(&url, request).await
    }
}

impl std::fmt::Debug for DataApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataApiClient")
            .field("base_url", &self.base_url)
            .field("property", &self.property)
            .finish()
    }
}
