//! Unified error types for the GA4 Reports MCP Server.

use reqwest::StatusCode;
use thiserror::Error;

/// Maximum length of an error message handed back to callers.
pub const MAX_ERROR_MESSAGE_LEN: usize = 800;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token request failed with status {status}: {body}")]
    TokenRequestFailed { status: StatusCode, body: String },

    #[error("Token parse error: {0}")]
    TokenParse(String),

    #[error("No token available")]
    NoToken,

    #[error("Failed to create HTTP client: {0}")]
    HttpClientInit(String),
}

/// Analytics Data API request/response errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("Analytics API error [{code}]: {message}")]
    Google {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to create HTTP client: {0}")]
    HttpClientInit(String),

    #[error("No analytics property configured (set property_id)")]
    MissingProperty,
}

/// Failure classes surfaced by tool invocations.
///
/// Every variant is recovered at the gateway and turned into a failure
/// envelope; none of them reach the transport as a raw fault.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Backend query failed: {0}")]
    Backend(String),

    #[error("Comparison period not resolvable: {0}")]
    NotResolvable(String),

    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),
}

impl ToolError {
    pub const CODE_NOT_FOUND: i32 = -32601;
    pub const CODE_INVALID: i32 = -32602;
    pub const CODE_INTERNAL: i32 = -32603;

    /// JSON-RPC style error code for this failure class.
    pub fn code(&self) -> i32 {
        match self {
            ToolError::NotFound(_) | ToolError::UnknownMethod(_) => Self::CODE_NOT_FOUND,
            ToolError::Backend(_) => Self::CODE_INTERNAL,
            ToolError::Configuration(_)
            | ToolError::Validation(_)
            | ToolError::NotResolvable(_) => Self::CODE_INVALID,
        }
    }

    /// Short machine-readable kind, used in structured messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Configuration(_) => "configuration_error",
            ToolError::Validation(_) => "validation_error",
            ToolError::Backend(_) => "backend_query_error",
            ToolError::NotResolvable(_) => "not_resolvable",
            ToolError::NotFound(_) | ToolError::UnknownMethod(_) => "not_found",
        }
    }

    /// Caller-facing message, bounded to [`MAX_ERROR_MESSAGE_LEN`].
    pub fn envelope_message(&self) -> String {
        truncate_message(&self.to_string(), MAX_ERROR_MESSAGE_LEN)
    }
}

impl From<ApiError> for ToolError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::MissingProperty => ToolError::Configuration(err.to_string()),
            other => ToolError::Backend(other.to_string()),
        }
    }
}

const TRUNCATION_SUFFIX: &str = "…(truncated)";

/// Truncate a message to at most `max_len` characters, suffix included.
pub fn truncate_message(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message.to_string();
    }
    let keep = max_len.saturating_sub(TRUNCATION_SUFFIX.chars().count());
    let cut = message
        .char_indices()
        .nth(keep)
        .map_or(message.len(), |(index, _)| index);
    format!("{}{}", &message[..cut], TRUNCATION_SUFFIX)
}
