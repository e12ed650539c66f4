//! Gmail REST API client
//!
//! A narrow, explicitly-typed adapter over the Gmail HTTP API exposing exactly
//! the operations the tools need: list message ids by query, fetch message
//! metadata with selected headers, and create a draft. Holds the OAuth token
//! behind a mutex and refreshes it transparently when expired.

use std::sync::Arc;
use std::time::SystemTime;

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::auth::{self, TokenSet};
use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};

const GMAIL_API_BASE_URL: &str = "https://gmail.googleapis.com";

/// One message's fetched metadata
///
/// The header list is an ordered snapshot as returned by the provider;
/// duplicate names are possible and order is preserved.
#[derive(Debug, Clone)]
pub struct MessageMetadata {
    pub id: String,
    pub thread_id: Option<String>,
    pub snippet: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// Authenticated Gmail API client
///
/// Created once per process and shared across tool invocations. All methods
/// borrow `&self`; the only interior mutation is the token slot.
#[derive(Debug)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    config: Arc<ServerConfig>,
    token: Mutex<TokenSet>,
}

impl GmailClient {
    /// Authorize against Google and construct the client
    ///
    /// First run triggers the interactive browser flow; subsequent runs load
    /// (and refresh if needed) the stored token.
    pub async fn connect(config: Arc<ServerConfig>) -> AppResult<Self> {
        let token = auth::authorize(&config).await?;
        tracing::debug!("gmail client authorized");
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: GMAIL_API_BASE_URL.to_owned(),
            config,
            token: Mutex::new(token),
        })
    }

    /// List message ids matching a Gmail search query
    ///
    /// Returns ids in the order the provider reports them.
    pub async fn list_message_ids(
        &self,
        query: &str,
        max_results: usize,
    ) -> AppResult<Vec<String>> {
        let params = vec![
            ("maxResults".to_owned(), max_results.to_string()),
            ("q".to_owned(), query.to_owned()),
        ];
        let list: GmailMessageListResource = self
            .get_json("/gmail/v1/users/me/messages", Some(&params))
            .await?;

        Ok(list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|entry| entry.id)
            .collect())
    }

    /// Fetch one message's metadata: thread id, snippet, and the named headers
    pub async fn get_metadata(
        &self,
        id: &str,
        header_names: &[&str],
    ) -> AppResult<MessageMetadata> {
        let mut params = vec![("format".to_owned(), "metadata".to_owned())];
        for name in header_names {
            params.push(("metadataHeaders".to_owned(), (*name).to_owned()));
        }

        let resource: GmailMessageResource = self
            .get_json(&format!("/gmail/v1/users/me/messages/{id}"), Some(&params))
            .await?;
        Ok(resource.into_metadata())
    }

    /// Create a draft from an encoded raw message, attached to a thread
    ///
    /// Returns the new draft's id.
    pub async fn create_draft(&self, raw: &str, thread_id: &str) -> AppResult<String> {
        let request = GmailDraftCreateRequest {
            message: GmailDraftMessage {
                raw: raw.to_owned(),
                thread_id: thread_id.to_owned(),
            },
        };
        let response: GmailDraftResource = self
            .post_json("/gmail/v1/users/me/drafts", &request)
            .await?;
        tracing::debug!(draft_id = %response.id, "draft created");
        Ok(response.id)
    }

    /// Current access token, refreshed and re-persisted if expired
    async fn access_token(&self) -> AppResult<String> {
        let mut token = self.token.lock().await;
        if token.is_expired(SystemTime::now()) {
            tracing::debug!("access token expired; refreshing");
            let refreshed = auth::refresh(&self.config, &token).await?;
            *token = refreshed;
        }
        Ok(token.access_token.clone())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: Option<&[(String, String)]>,
    ) -> AppResult<T> {
        let access_token = self.access_token().await?;
        let url = self.endpoint_url(endpoint)?;
        let mut request = self.http.get(url).bearer_auth(access_token);
        if let Some(query) = query {
            request = request.query(query);
        }

        let response = request.send().await?;
        self.parse_json_response(response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> AppResult<T> {
        let access_token = self.access_token().await?;
        let url = self.endpoint_url(endpoint)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await?;

        self.parse_json_response(response).await
    }

    fn endpoint_url(&self, endpoint: &str) -> AppResult<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.set_path(endpoint.trim_start_matches('/'));
        Ok(url)
    }

    async fn parse_json_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(map_api_error(status, &body))
    }
}

#[derive(Debug, Deserialize)]
struct GmailMessageResource {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: Option<String>,
    snippet: Option<String>,
    payload: Option<GmailMessagePayload>,
}

impl GmailMessageResource {
    fn into_metadata(self) -> MessageMetadata {
        let headers = self
            .payload
            .and_then(|payload| payload.headers)
            .unwrap_or_default()
            .into_iter()
            .map(|header| (header.name, header.value))
            .collect();

        MessageMetadata {
            id: self.id,
            thread_id: self.thread_id,
            snippet: self.snippet,
            headers,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GmailMessagePayload {
    headers: Option<Vec<GmailMessageHeader>>,
}

#[derive(Debug, Deserialize)]
struct GmailMessageHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GmailMessageListResource {
    messages: Option<Vec<GmailMessageListEntry>>,
}

#[derive(Debug, Deserialize)]
struct GmailMessageListEntry {
    id: String,
}

#[derive(Debug, Serialize)]
struct GmailDraftCreateRequest {
    message: GmailDraftMessage,
}

#[derive(Debug, Serialize)]
struct GmailDraftMessage {
    raw: String,
    #[serde(rename = "threadId")]
    thread_id: String,
}

#[derive(Debug, Deserialize)]
struct GmailDraftResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GmailApiErrorEnvelope {
    error: GmailApiError,
}

#[derive(Debug, Deserialize)]
struct GmailApiError {
    code: Option<u16>,
    status: Option<String>,
    message: Option<String>,
    errors: Option<Vec<GmailApiErrorDetail>>,
}

#[derive(Debug, Deserialize)]
struct GmailApiErrorDetail {
    reason: Option<String>,
}

fn map_api_error(status: StatusCode, body: &str) -> AppError {
    let message = parse_api_error_message(body).unwrap_or_else(|| {
        let body = body.trim();
        if body.is_empty() {
            "no error details in response body".to_owned()
        } else {
            body.to_owned()
        }
    });

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return AppError::Auth(format!(
            "gmail api authorization failed ({status}): {message}"
        ));
    }

    AppError::Api(format!("gmail api request failed ({status}): {message}"))
}

fn parse_api_error_message(body: &str) -> Option<String> {
    let envelope = serde_json::from_str::<GmailApiErrorEnvelope>(body).ok()?;
    let mut parts = Vec::new();

    if let Some(message) = envelope.error.message {
        parts.push(message);
    }

    if let Some(status) = envelope.error.status {
        parts.push(format!("status={status}"));
    }

    if let Some(code) = envelope.error.code {
        parts.push(format!("code={code}"));
    }

    if let Some(reason) = envelope
        .error
        .errors
        .and_then(|errors| errors.into_iter().find_map(|detail| detail.reason))
    {
        parts.push(format!("reason={reason}"));
    }

    if parts.is_empty() {
        return None;
    }

    Some(parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_message_resource_to_metadata() {
        let resource: GmailMessageResource = serde_json::from_str(
            r#"{
                "id": "msg-123",
                "threadId": "thread-456",
                "snippet": "hello world",
                "payload": {
                    "headers": [
                        {"name": "Subject", "value": "hello"},
                        {"name": "From", "value": "dev@example.com"},
                        {"name": "Message-ID", "value": "<abc@example.com>"}
                    ]
                }
            }"#,
        )
        .expect("resource must parse");

        let meta = resource.into_metadata();
        assert_eq!(meta.id, "msg-123");
        assert_eq!(meta.thread_id.as_deref(), Some("thread-456"));
        assert_eq!(meta.snippet.as_deref(), Some("hello world"));
        assert_eq!(meta.headers[0], ("Subject".to_owned(), "hello".to_owned()));
        assert_eq!(meta.headers.len(), 3);
    }

    #[test]
    fn missing_payload_yields_empty_headers() {
        let resource: GmailMessageResource =
            serde_json::from_str(r#"{"id": "msg-123"}"#).expect("resource must parse");

        let meta = resource.into_metadata();
        assert!(meta.headers.is_empty());
        assert!(meta.thread_id.is_none());
    }

    #[test]
    fn draft_request_serializes_thread_id_camel_case() {
        let request = GmailDraftCreateRequest {
            message: GmailDraftMessage {
                raw: "abc".to_owned(),
                thread_id: "thread-1".to_owned(),
            },
        };
        let json = serde_json::to_value(&request).expect("must serialize");
        assert_eq!(json["message"]["threadId"], "thread-1");
        assert_eq!(json["message"]["raw"], "abc");
    }

    #[test]
    fn maps_unauthorized_as_auth_error() {
        let error = map_api_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"code":401,"message":"Request had invalid authentication credentials.","status":"UNAUTHENTICATED"}}"#,
        );

        match error {
            AppError::Auth(message) => {
                assert!(message.contains("invalid authentication credentials"));
            }
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[test]
    fn maps_not_found_as_api_error() {
        let error = map_api_error(
            StatusCode::NOT_FOUND,
            r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND"}}"#,
        );

        match error {
            AppError::Api(message) => {
                assert!(message.contains("Requested entity was not found"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
