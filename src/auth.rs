//! Bearer credential acquisition.
//!
//! A credential is fetched once per session with the OAuth2 client-credentials
//! grant against a Keycloak-style realm. Nothing is cached or persisted.

use std::fmt;
use std::io::IsTerminal;
use std::time::Duration;

use serde::Deserialize;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::AuthError;

pub const CLIENT_SECRET_ENV: &str = "KEYCLOAK_CLIENT_SECRET";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Short-lived bearer token. The token text is wiped on drop and never printed.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    token: String,
    #[zeroize(skip)]
    expires_in: Option<Duration>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_in: None,
        }
    }

    pub fn with_expiry(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for an `Authorization` header or metadata entry.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Client credentials presented to the identity provider.
#[derive(Clone)]
pub struct ClientCredentials {
    pub server_url: String,
    pub client_id: String,
    pub realm: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("server_url", &self.server_url)
            .field("client_id", &self.client_id)
            .field("realm", &self.realm)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Drop for ClientCredentials {
    fn drop(&mut self) {
        self.client_secret.zeroize();
    }
}

pub trait TokenProvider {
    /// Exchange client credentials for a bearer credential. Not retried.
    fn obtain(&self, credentials: &ClientCredentials) -> Result<Credential, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Client-credentials grant against `{server}/realms/{realm}/protocol/openid-connect/token`.
pub struct KeycloakTokenProvider {
    agent: ureq::Agent,
}

impl KeycloakTokenProvider {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build(),
        }
    }

    pub fn token_url(server_url: &str, realm: &str) -> Result<Url, AuthError> {
        let mut base = server_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| AuthError::Unreachable(format!("invalid server url {}: {}", server_url, e)))?;
        base.join(&format!("realms/{}/protocol/openid-connect/token", realm))
            .map_err(|e| AuthError::Unreachable(format!("invalid realm {}: {}", realm, e)))
    }
}

impl Default for KeycloakTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenProvider for KeycloakTokenProvider {
    fn obtain(&self, credentials: &ClientCredentials) -> Result<Credential, AuthError> {
        let url = Self::token_url(&credentials.server_url, &credentials.realm)?;
        log::debug!("requesting token for client {} from {}", credentials.client_id, url);

        let response = self.agent.post(url.as_str()).send_form(&[
            ("grant_type", "client_credentials"),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ]);

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                return Err(AuthError::Rejected {
                    status,
                    detail: error_detail(&body),
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(AuthError::Unreachable(transport.to_string()));
            }
        };

        let body = response
            .into_string()
            .map_err(|e| AuthError::Malformed(format!("read token response: {}", e)))?;
        parse_token_response(&body)
    }
}

fn parse_token_response(body: &str) -> Result<Credential, AuthError> {
    let parsed: TokenResponse =
        serde_json::from_str(body).map_err(|e| AuthError::Malformed(e.to_string()))?;
    let token = parsed
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::Malformed("missing access_token".to_string()))?;
    let credential = Credential::new(token);
    Ok(match parsed.expires_in {
        Some(secs) => credential.with_expiry(Duration::from_secs(secs)),
        None => credential,
    })
}

fn error_detail(body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(TokenErrorResponse {
            error_description: Some(description),
            ..
        }) => description,
        Ok(TokenErrorResponse {
            error: Some(error), ..
        }) => error,
        _ => "no error detail".to_string(),
    }
}

/// Resolve the client secret from the environment, falling back to a hidden-ish
/// prompt when stdin is a terminal.
pub fn client_secret_from_env_or_prompt() -> Result<String, AuthError> {
    if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
        if !secret.trim().is_empty() {
            return Ok(secret);
        }
    }
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return Err(AuthError::MissingSecret(format!(
            "{} is not set and stdin is not a terminal",
            CLIENT_SECRET_ENV
        )));
    }
    eprintln!(
        "(You can also supply the client secret via env var {})",
        CLIENT_SECRET_ENV
    );
    eprint!("Keycloak client secret: ");
    let mut line = String::new();
    stdin
        .read_line(&mut line)
        .map_err(|e| AuthError::MissingSecret(e.to_string()))?;
    let secret = line.trim().to_string();
    line.zeroize();
    if secret.is_empty() {
        return Err(AuthError::MissingSecret("empty client secret".to_string()));
    }
    Ok(secret)
}
