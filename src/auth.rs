//! OAuth 2.0 installed-app authorization for the Gmail API
//!
//! Loads client secrets from the Google Cloud Console `credentials.json`
//! format, persists a refreshable [`TokenSet`] at the configured token path,
//! and runs the interactive loopback authorization flow (PKCE + state) on
//! first use. Expired access tokens are refreshed with the stored refresh
//! token and rewritten to disk.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time;
use url::Url;

use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};

const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const OAUTH_CALLBACK_TIMEOUT_SECS: u64 = 180;
const OAUTH_SCOPES: &str =
    "https://www.googleapis.com/auth/gmail.readonly https://www.googleapis.com/auth/gmail.compose";

/// Stored OAuth token material
///
/// Serialized as JSON at the configured token path. The refresh token is kept
/// across refreshes when Google omits it from the refresh response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at_unix: Option<u64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TokenSet {
    const EXPIRY_SKEW_SECS: u64 = 30;

    /// Whether the access token is expired (with a small skew so a token about
    /// to lapse is not handed to an API call)
    pub fn is_expired(&self, now: SystemTime) -> bool {
        let Some(expires_at) = self.expires_at_unix else {
            return false;
        };

        let Ok(duration) = now.duration_since(UNIX_EPOCH) else {
            return false;
        };

        duration.as_secs().saturating_add(Self::EXPIRY_SKEW_SECS) >= expires_at
    }
}

/// OAuth client configuration parsed from `credentials.json`
#[derive(Debug, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: Option<SecretString>,
}

/// Wrapper matching the Google client secrets file layout
///
/// Desktop-app credentials carry an `installed` key; web-app credentials a
/// `web` key. Either is accepted.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

/// Load client secrets from the configured credentials path
///
/// # Errors
///
/// Returns `MissingCredentials` if the file does not exist, `Internal` if it
/// cannot be parsed.
pub fn load_client_secrets(path: &Path) -> AppResult<ClientSecrets> {
    if !path.exists() {
        return Err(AppError::MissingCredentials(format!(
            "missing OAuth credentials file: {}; download it from Google Cloud Console \
             and set GOOGLE_CREDENTIALS_PATH",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)?;
    let file: ClientSecretsFile = serde_json::from_str(&raw).map_err(|e| {
        AppError::Internal(format!(
            "malformed credentials file {}: {e}",
            path.display()
        ))
    })?;

    file.installed.or(file.web).ok_or_else(|| {
        AppError::Internal(format!(
            "credentials file {} has neither 'installed' nor 'web' section",
            path.display()
        ))
    })
}

/// Read the stored token, if any
pub fn load_token(path: &Path) -> AppResult<Option<TokenSet>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)?;
    let token = serde_json::from_str(&raw)
        .map_err(|e| AppError::Internal(format!("malformed token file {}: {e}", path.display())))?;
    Ok(Some(token))
}

/// Write the token to disk, restricting permissions on unix
pub fn save_token(path: &Path, token: &TokenSet) -> AppResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let payload = serde_json::to_string_pretty(token)?;
    fs::write(path, payload)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}

/// Obtain a valid token set, running the interactive flow if required
///
/// Order of attempts:
/// 1. Stored token that is still valid.
/// 2. Refresh with the stored refresh token.
/// 3. Interactive browser authorization (requires the credentials file).
///
/// The resulting token is always persisted before returning.
pub async fn authorize(config: &ServerConfig) -> AppResult<TokenSet> {
    if let Some(token) = load_token(&config.token_path)? {
        if !token.is_expired(SystemTime::now()) {
            tracing::debug!("using stored access token");
            return Ok(token);
        }

        if let Some(refresh_token) = token.refresh_token.clone() {
            tracing::debug!("stored access token expired; refreshing");
            let secrets = load_client_secrets(&config.credentials_path)?;
            let refreshed = exchange_refresh_token(&secrets, &refresh_token).await?;
            save_token(&config.token_path, &refreshed)?;
            return Ok(refreshed);
        }
    }

    let secrets = load_client_secrets(&config.credentials_path)?;
    let token = run_interactive_flow(&secrets).await?;
    save_token(&config.token_path, &token)?;
    Ok(token)
}

/// Refresh an expired token and persist the result
///
/// Falls back to the full interactive flow if no refresh token is stored.
pub async fn refresh(config: &ServerConfig, current: &TokenSet) -> AppResult<TokenSet> {
    let secrets = load_client_secrets(&config.credentials_path)?;

    let refreshed = match current.refresh_token.clone() {
        Some(refresh_token) => exchange_refresh_token(&secrets, &refresh_token).await?,
        None => run_interactive_flow(&secrets).await?,
    };

    save_token(&config.token_path, &refreshed)?;
    Ok(refreshed)
}

/// Run the loopback authorization flow
///
/// Binds an ephemeral local port for the redirect, opens the system browser
/// (printing the URL to stderr if that fails), waits for the callback, and
/// exchanges the authorization code.
async fn run_interactive_flow(secrets: &ClientSecrets) -> AppResult<TokenSet> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| AppError::Auth(format!("failed to bind oauth callback listener: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| AppError::Auth(format!("failed to read callback listener address: {e}")))?
        .port();
    let redirect_uri = format!("http://127.0.0.1:{port}/");

    let flow = LoginFlow::new(secrets, &redirect_uri)?;
    if !open_browser(&flow.authorization_url) {
        eprintln!(
            "open this URL in your browser to authorize Gmail access:\n{}",
            flow.authorization_url
        );
    }

    let code = wait_for_auth_callback(
        listener,
        &flow.state,
        Duration::from_secs(OAUTH_CALLBACK_TIMEOUT_SECS),
    )
    .await?;

    exchange_auth_code(secrets, &redirect_uri, &code, &flow.code_verifier).await
}

/// Authorization request state: URL, PKCE verifier, and CSRF state token
#[derive(Debug)]
struct LoginFlow {
    authorization_url: String,
    code_verifier: String,
    state: String,
}

impl LoginFlow {
    fn new(secrets: &ClientSecrets, redirect_uri: &str) -> AppResult<Self> {
        let state = random_token(32);
        let code_verifier = random_token(96);
        let code_challenge = pkce_challenge(&code_verifier);

        let mut url = Url::parse(GOOGLE_AUTH_ENDPOINT)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &secrets.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", OAUTH_SCOPES)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &state)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256");

        Ok(Self {
            authorization_url: url.to_string(),
            code_verifier,
            state,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    token_type: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

async fn exchange_auth_code(
    secrets: &ClientSecrets,
    redirect_uri: &str,
    code: &str,
    code_verifier: &str,
) -> AppResult<TokenSet> {
    let mut form = HashMap::from([
        ("grant_type", "authorization_code".to_owned()),
        ("code", code.to_owned()),
        ("client_id", secrets.client_id.clone()),
        ("redirect_uri", redirect_uri.to_owned()),
        ("code_verifier", code_verifier.to_owned()),
    ]);

    if let Some(client_secret) = &secrets.client_secret {
        form.insert("client_secret", client_secret.expose_secret().to_owned());
    }

    let response = reqwest::Client::new()
        .post(GOOGLE_TOKEN_ENDPOINT)
        .form(&form)
        .send()
        .await?;

    parse_token_response(response).await
}

async fn exchange_refresh_token(
    secrets: &ClientSecrets,
    refresh_token: &str,
) -> AppResult<TokenSet> {
    let mut form = HashMap::from([
        ("grant_type", "refresh_token".to_owned()),
        ("refresh_token", refresh_token.to_owned()),
        ("client_id", secrets.client_id.clone()),
    ]);

    if let Some(client_secret) = &secrets.client_secret {
        form.insert("client_secret", client_secret.expose_secret().to_owned());
    }

    let response = reqwest::Client::new()
        .post(GOOGLE_TOKEN_ENDPOINT)
        .form(&form)
        .send()
        .await?;

    let mut token = parse_token_response(response).await?;
    if token.refresh_token.is_none() {
        token.refresh_token = Some(refresh_token.to_owned());
    }

    Ok(token)
}

async fn parse_token_response(response: reqwest::Response) -> AppResult<TokenSet> {
    if response.status().is_success() {
        let payload: OAuthTokenResponse = response.json().await?;
        return Ok(TokenSet {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_at_unix: expires_at_unix(payload.expires_in),
            token_type: payload.token_type,
            scope: payload.scope,
        });
    }

    let status = response.status();
    let body = response.text().await?;
    if let Ok(err_payload) = serde_json::from_str::<OAuthErrorResponse>(&body) {
        let error = err_payload
            .error
            .unwrap_or_else(|| "unknown_oauth_error".to_owned());
        let description = err_payload
            .error_description
            .unwrap_or_else(|| "no description".to_owned());
        return Err(AppError::Auth(format!(
            "oauth token exchange failed ({status}): {error} ({description})"
        )));
    }

    Err(AppError::Auth(format!(
        "oauth token exchange failed ({status}): {body}"
    )))
}

fn expires_at_unix(expires_in: Option<u64>) -> Option<u64> {
    let expires_in = expires_in?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(now.saturating_add(expires_in))
}

/// Accept one HTTP request on the callback listener and extract the code
async fn wait_for_auth_callback(
    listener: TcpListener,
    expected_state: &str,
    timeout: Duration,
) -> AppResult<String> {
    let callback = time::timeout(timeout, async {
        let (mut stream, _) = listener.accept().await?;

        let mut buf = vec![0_u8; 8192];
        let size = stream.read(&mut buf).await?;
        if size == 0 {
            return Err(AppError::Auth("empty oauth callback request".to_owned()));
        }

        let request = String::from_utf8_lossy(&buf[..size]);
        let request_line = request
            .lines()
            .next()
            .ok_or_else(|| AppError::Auth("malformed oauth callback request".to_owned()))?;

        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default();
        let target = parts.next().unwrap_or_default();

        if method != "GET" {
            write_callback_response(
                &mut stream,
                "405 Method Not Allowed",
                "oauth callback only accepts GET requests",
            )
            .await?;
            return Err(AppError::Auth(
                "oauth callback received non-GET request".to_owned(),
            ));
        }

        let code = match extract_callback_code(target, expected_state) {
            Ok(code) => {
                write_callback_response(
                    &mut stream,
                    "200 OK",
                    "gmail authorization complete. you can return to the terminal.",
                )
                .await?;
                code
            }
            Err(err) => {
                let _ = write_callback_response(
                    &mut stream,
                    "400 Bad Request",
                    &format!("oauth callback error: {err}"),
                )
                .await;
                return Err(err);
            }
        };

        Ok(code)
    })
    .await
    .map_err(|_| AppError::Auth("timed out waiting for oauth callback".to_owned()))??;

    Ok(callback)
}

/// Parse the callback query string, checking the CSRF state token
fn extract_callback_code(target: &str, expected_state: &str) -> AppResult<String> {
    let callback_url = Url::parse(&format!("http://localhost{target}"))?;

    let mut code = None;
    let mut state = None;
    let mut oauth_error = None;
    let mut oauth_error_description = None;

    for (key, value) in callback_url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            "error" => oauth_error = Some(value.to_string()),
            "error_description" => oauth_error_description = Some(value.to_string()),
            _ => {}
        }
    }

    if let Some(error) = oauth_error {
        let description = oauth_error_description.unwrap_or_else(|| "no description".to_owned());
        return Err(AppError::Auth(format!(
            "oauth authorization failed: {error} ({description})"
        )));
    }

    let received_state = state
        .ok_or_else(|| AppError::Auth("oauth callback missing state parameter".to_owned()))?;
    if received_state != expected_state {
        return Err(AppError::Auth(
            "oauth state mismatch; aborting authorization".to_owned(),
        ));
    }

    code.ok_or_else(|| AppError::Auth("oauth callback missing code parameter".to_owned()))
}

async fn write_callback_response(
    stream: &mut tokio::net::TcpStream,
    status: &str,
    message: &str,
) -> AppResult<()> {
    let body = format!(
        "<!doctype html><html><body><p>{}</p></body></html>",
        escape_html(message)
    );

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0_u8; len];
    rand::thread_rng().fill(bytes.as_mut_slice());
    URL_SAFE_NO_PAD.encode(bytes)
}

fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn open_browser(url: &str) -> bool {
    #[cfg(target_os = "macos")]
    {
        return std::process::Command::new("open")
            .arg(url)
            .status()
            .is_ok_and(|status| status.success());
    }

    #[cfg(target_os = "linux")]
    {
        return std::process::Command::new("xdg-open")
            .arg(url)
            .status()
            .is_ok_and(|status| status.success());
    }

    #[cfg(target_os = "windows")]
    {
        return std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .status()
            .is_ok_and(|status| status.success());
    }

    #[allow(unreachable_code)]
    false
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_callback_code() {
        let code = extract_callback_code("/?code=abc123&state=xyz", "xyz")
            .expect("callback should parse");
        assert_eq!(code, "abc123");
    }

    #[test]
    fn rejects_state_mismatch() {
        let result = extract_callback_code("/?code=abc123&state=wrong", "expected");
        assert!(result.is_err());
    }

    #[test]
    fn reports_provider_denial() {
        let err = extract_callback_code("/?error=access_denied&state=xyz", "xyz")
            .expect_err("denial must fail");
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn builds_pkce_challenge() {
        let challenge = pkce_challenge("test_verifier_value");
        assert!(!challenge.is_empty());
    }

    #[test]
    fn random_token_is_non_empty() {
        let token = random_token(32);
        assert!(token.len() >= 43);
    }

    #[test]
    fn token_without_expiry_never_expires() {
        let token = TokenSet {
            access_token: "t".to_owned(),
            refresh_token: None,
            expires_at_unix: None,
            token_type: None,
            scope: None,
        };
        assert!(!token.is_expired(SystemTime::now()));
    }

    #[test]
    fn token_expiry_applies_skew() {
        let now = SystemTime::now();
        let now_unix = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("clock after epoch")
            .as_secs();

        let about_to_lapse = TokenSet {
            access_token: "t".to_owned(),
            refresh_token: None,
            expires_at_unix: Some(now_unix + 10),
            token_type: None,
            scope: None,
        };
        assert!(about_to_lapse.is_expired(now));

        let comfortably_valid = TokenSet {
            access_token: "t".to_owned(),
            refresh_token: None,
            expires_at_unix: Some(now_unix + 3600),
            token_type: None,
            scope: None,
        };
        assert!(!comfortably_valid.is_expired(now));
        assert!(comfortably_valid.is_expired(now + Duration::from_secs(3600)));
    }

    #[test]
    fn accepts_installed_client_secrets() {
        let raw = r#"{"installed":{"client_id":"id-123.apps.googleusercontent.com","client_secret":"shh","redirect_uris":["http://localhost"]}}"#;
        let file: ClientSecretsFile = serde_json::from_str(raw).expect("must parse");
        let secrets = file.installed.expect("installed section present");
        assert_eq!(secrets.client_id, "id-123.apps.googleusercontent.com");
        assert!(secrets.client_secret.is_some());
    }
}
