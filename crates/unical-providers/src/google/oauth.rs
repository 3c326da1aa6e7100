//! OAuth 2.0 for Google APIs: token refresh and the one-time PKCE flow.
//!
//! The interactive flow is the Authorization Code grant with PKCE
//! (RFC 7636) and a loopback redirect:
//!
//! 1. Generate a code verifier and its SHA-256 challenge
//! 2. Bind a listener on `127.0.0.1` with an OS-assigned port
//! 3. Open the browser on Google's consent page
//! 4. Read the authorization code from the redirect
//! 5. Exchange the code (with verifier) for access and refresh tokens

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::http::transport_error;

use super::config::OAuthCredentials;
use super::tokens::TokenInfo;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// Timeout for waiting for the OAuth callback.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Error body of the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth client for Google APIs.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    token_url: String,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a new OAuth client with the given credentials.
    pub fn new(
        credentials: OAuthCredentials,
        token_url: impl Into<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::network(format!("Failed to create HTTP client: {e}")).with_source(e)
            })?;

        Ok(Self {
            credentials,
            token_url: token_url.into(),
            http_client,
        })
    }

    pub fn credentials(&self) -> &OAuthCredentials {
        &self.credentials
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// A revoked or expired refresh token (`invalid_grant`) means the
    /// interactive flow has to be run again.
    pub(crate) async fn refresh(&self, refresh_token: &str) -> ProviderResult<TokenResponse> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = self.post_token(&params).await?;
        info!("Refreshed Google access token");
        Ok(response)
    }

    /// Runs the interactive browser flow and returns the obtained tokens.
    pub async fn authorize(&self, scopes: &[String]) -> ProviderResult<TokenInfo> {
        let pkce = PkceFlow::new();

        let (listener, port) = Self::bind_loopback_server()?;
        let redirect_uri = format!("http://127.0.0.1:{port}/callback");
        let auth_url = pkce.build_auth_url(&self.credentials.client_id, &redirect_uri, scopes);

        info!("Starting OAuth flow, opening browser");
        debug!(url = %auth_url, "Authorization URL");
        if let Err(e) = open::that(&auth_url) {
            warn!(error = %e, "Failed to open browser");
        }
        eprintln!("\nIf the browser did not open, visit this URL:\n\n{auth_url}\n");

        let (code, received_state) = Self::wait_for_callback(listener)?;
        if received_state != pkce.state {
            return Err(ProviderError::authentication(
                "OAuth state mismatch - possible CSRF attack",
            ));
        }

        info!("Received authorization code, exchanging for tokens");
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        let response = self.post_token(&params).await?;

        Ok(TokenInfo::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            scopes.to_vec(),
        )
        .with_client(&self.credentials, &self.token_url))
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> ProviderResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<TokenErrorResponse>(&body).ok();
            let reason = detail
                .as_ref()
                .map(|d| match &d.error_description {
                    Some(desc) => format!("{}: {desc}", d.error),
                    None => d.error.clone(),
                })
                .unwrap_or_else(|| status.to_string());

            if status == StatusCode::BAD_REQUEST
                && detail.as_ref().is_some_and(|d| d.error == "invalid_grant")
            {
                return Err(ProviderError::authentication_required(format!(
                    "refresh token rejected ({reason})"
                )));
            }
            return Err(ProviderError::authentication(format!(
                "token request failed ({status}): {reason}"
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {e}")).with_source(e)
        })
    }

    fn bind_loopback_server() -> ProviderResult<(TcpListener, u16)> {
        let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| {
            ProviderError::configuration(format!("failed to bind loopback listener: {e}"))
        })?;
        let port = listener
            .local_addr()
            .map_err(|e| ProviderError::internal(format!("loopback listener address: {e}")))?
            .port();
        debug!(port, "Bound loopback server");
        Ok((listener, port))
    }

    /// Waits for the OAuth callback and extracts the authorization code.
    fn wait_for_callback(listener: TcpListener) -> ProviderResult<(String, String)> {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Some(result) = Self::handle_callback(stream) {
                            let _ = tx.send(result);
                            return;
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                }
            }
        });

        match rx.recv_timeout(CALLBACK_TIMEOUT) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(ProviderError::authentication("OAuth callback timeout"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(ProviderError::internal("callback channel disconnected"))
            }
        }
    }

    /// Handles one request on the callback server. Requests for other paths
    /// (favicon, probes) yield `None`.
    fn handle_callback(mut stream: TcpStream) -> Option<ProviderResult<(String, String)>> {
        let mut request_line = String::new();
        BufReader::new(&stream).read_line(&mut request_line).ok()?;

        let target = parse_callback_target(&request_line)?;
        let params = CallbackParams::parse(target);

        let page = if params.error.is_some() || params.code.is_none() {
            "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
            <html><body><h1>Authorization Failed</h1>\
            <p>You can close this window.</p></body></html>"
        } else {
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
            <html><body><h1>Authorization Successful</h1>\
            <p>You can close this window and return to the terminal.</p></body></html>"
        };
        let _ = stream.write_all(page.as_bytes());
        let _ = stream.flush();

        Some(params.into_result())
    }
}

/// Returns the request target of a `GET /callback...` request line.
fn parse_callback_target(request_line: &str) -> Option<&str> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    target.starts_with("/callback").then_some(target)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl CallbackParams {
    fn parse(target: &str) -> Self {
        let query = target.split_once('?').map(|(_, q)| q).unwrap_or_default();
        let mut params = Self::default();
        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_default();
            match key {
                "code" => params.code = Some(value),
                "state" => params.state = Some(value),
                "error" => params.error = Some(value),
                _ => {}
            }
        }
        params
    }

    fn into_result(self) -> ProviderResult<(String, String)> {
        if let Some(error) = self.error {
            return Err(ProviderError::authentication(format!(
                "authorization denied: {error}"
            )));
        }
        match self.code {
            Some(code) => Ok((code, self.state.unwrap_or_default())),
            None => Err(ProviderError::authentication(
                "missing authorization code in callback",
            )),
        }
    }
}

/// PKCE flow state (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state for CSRF protection.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the Google OAuth authorization URL.
    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str, scopes: &[String]) -> String {
        format!(
            "{GOOGLE_AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}
