//! Configuration module for credential locations and server settings
//!
//! All configuration is loaded from environment variables. Credential file
//! locations follow the `GOOGLE_*_PATH` convention; `MAX_UNREAD` sets the
//! default page size for unread listing.

use std::env;
use std::env::VarError;
use std::path::PathBuf;

use crate::errors::{AppError, AppResult};

/// Server-wide configuration
///
/// Wraps credential file locations and listing defaults. Cloned into MCP tool
/// handlers via `Arc` for thread-safe shared access.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the OAuth client secrets file downloaded from Google Cloud Console
    pub credentials_path: PathBuf,
    /// Path to the refreshable token file written after authorization
    pub token_path: PathBuf,
    /// Default number of unread messages returned when the caller does not ask
    /// for a specific count
    pub max_unread_default: usize,
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a variable is set but malformed.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// GOOGLE_CREDENTIALS_PATH=credentials.json
    /// GOOGLE_TOKEN_PATH=token.json
    /// MAX_UNREAD=10
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        Ok(Self {
            credentials_path: PathBuf::from(parse_string_env(
                "GOOGLE_CREDENTIALS_PATH",
                "credentials.json",
            )?),
            token_path: PathBuf::from(parse_string_env("GOOGLE_TOKEN_PATH", "token.json")?),
            max_unread_default: parse_usize_env("MAX_UNREAD", 10)?,
        })
    }
}

/// Read a string environment variable with default fallback
///
/// Returns `default` if unset or set to whitespace only.
fn parse_string_env(key: &str, default: &str) -> AppResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        Ok(_) | Err(VarError::NotPresent) => Ok(default.to_owned()),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a `usize` environment variable with default fallback
///
/// Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `usize`.
fn parse_usize_env(key: &str, default: usize) -> AppResult<usize> {
    match env::var(key) {
        Ok(v) => v.trim().parse::<usize>().map_err(|_| {
            AppError::InvalidInput(format!("invalid usize environment variable {key}: '{v}'"))
        }),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_string_env, parse_usize_env};

    #[test]
    fn string_env_falls_back_to_default_when_unset() {
        let value = parse_string_env("GMAIL_MCP_TEST_UNSET_STRING", "credentials.json")
            .expect("default must apply");
        assert_eq!(value, "credentials.json");
    }

    #[test]
    fn usize_env_falls_back_to_default_when_unset() {
        let value = parse_usize_env("GMAIL_MCP_TEST_UNSET_USIZE", 10).expect("default must apply");
        assert_eq!(value, 10);
    }
}
