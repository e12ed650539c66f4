//! Application error model with MCP error mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and maps each variant to the appropriate MCP `ErrorData` type for protocol
//! compliance.

use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

/// Application error type
///
/// Covers all error cases the Gmail MCP server may encounter. Each variant maps
/// to an appropriate MCP error code in [`ErrorData`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid tool input (empty/missing required argument, malformed request)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// OAuth credentials file absent on first run
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    /// Fetched message metadata is missing a required threading field
    #[error("resolution failed: {0}")]
    Resolution(String),
    /// Neither Reply-To nor From present on the original message
    #[error("missing recipient: {0}")]
    MissingRecipient(String),
    /// Authentication/authorization failure (token exchange, expired grant)
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Gmail API request failure (non-success status, transport error)
    #[error("gmail api error: {0}")]
    Api(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convert to MCP `ErrorData`
    ///
    /// Maps each `AppError` variant to the appropriate MCP error type and
    /// includes a structured `code` field for client error handling.
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_params`
    /// - `MissingCredentials` → `invalid_request`
    /// - `Resolution` → `invalid_request`
    /// - `MissingRecipient` → `invalid_request`
    /// - `Auth` → `invalid_request`
    /// - `Api` → `internal_error`
    /// - `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            Self::InvalidInput(msg) => {
                ErrorData::invalid_params(msg.clone(), Some(json!({ "code": "invalid_input" })))
            }
            Self::MissingCredentials(msg) => ErrorData::invalid_request(
                msg.clone(),
                Some(json!({ "code": "missing_credentials" })),
            ),
            Self::Resolution(msg) => {
                ErrorData::invalid_request(msg.clone(), Some(json!({ "code": "resolution_failed" })))
            }
            Self::MissingRecipient(msg) => ErrorData::invalid_request(
                msg.clone(),
                Some(json!({ "code": "missing_recipient" })),
            ),
            Self::Auth(msg) => {
                ErrorData::invalid_request(msg.clone(), Some(json!({ "code": "auth_failed" })))
            }
            Self::Api(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "api_error" })))
            }
            Self::Internal(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "internal" })))
            }
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Api(format!("http request failed: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("io failure: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("json failure: {err}"))
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        Self::Internal(format!("url parse failure: {err}"))
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;
