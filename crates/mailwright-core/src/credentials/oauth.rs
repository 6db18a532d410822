use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use super::credential::{Credential, parse_scope_list};

pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("missing refresh token")]
    MissingRefreshToken,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token response decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("token endpoint error {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("invalid expires_in value: {0}")]
    InvalidExpires(i64),
    #[error("authorization flow failed: {0}")]
    Flow(String),
    #[error("timed out waiting for the authorization callback")]
    CallbackTimeout,
}

/// OAuth client identity used against the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub token_endpoint: String,
}

impl OAuthClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
        }
    }

    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// Exchanges the credential's refresh token for a new access token.
///
/// The refresh token and scope set are carried over when the endpoint does not
/// return new ones.
pub async fn refresh_credential(
    http: &reqwest::Client,
    client: &OAuthClient,
    credential: &Credential,
) -> Result<Credential, OAuthError> {
    let refresh_token = match credential.refresh_token.as_deref() {
        Some(token) if !token.trim().is_empty() => token,
        _ => return Err(OAuthError::MissingRefreshToken),
    };

    let payload = post_token_request(
        http,
        &client.token_endpoint,
        &[
            ("grant_type", "refresh_token"),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ],
    )
    .await?;

    Ok(Credential {
        access_token: payload.access_token,
        refresh_token: payload
            .refresh_token
            .or_else(|| credential.refresh_token.clone()),
        scopes: payload
            .scope
            .as_deref()
            .map(parse_scope_list)
            .unwrap_or_else(|| credential.scopes.clone()),
        expires_at: expiry_after(payload.expires_in)?,
    })
}

/// Exchanges an authorization code from the consent redirect for a credential.
///
/// When the endpoint omits `scope`, the requested scopes are assumed granted.
pub async fn exchange_code(
    http: &reqwest::Client,
    client: &OAuthClient,
    code: &str,
    redirect_uri: &str,
    requested_scopes: &BTreeSet<String>,
) -> Result<Credential, OAuthError> {
    let payload = post_token_request(
        http,
        &client.token_endpoint,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
        ],
    )
    .await?;

    let refresh_token = payload.refresh_token.ok_or(OAuthError::MissingRefreshToken)?;

    Ok(Credential {
        access_token: payload.access_token,
        refresh_token: Some(refresh_token),
        scopes: payload
            .scope
            .as_deref()
            .map(parse_scope_list)
            .unwrap_or_else(|| requested_scopes.clone()),
        expires_at: expiry_after(payload.expires_in)?,
    })
}

async fn post_token_request(
    http: &reqwest::Client,
    endpoint: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, OAuthError> {
    let response = http.post(endpoint).form(form).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                warn!(status = status.as_u16(), error = %err, "failed to read token endpoint error body");
                format!("(response body unreadable: {err})")
            }
        };
        return Err(OAuthError::TokenEndpoint {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.text().await?;
    let payload: TokenResponse = serde_json::from_str(&body)?;
    if payload.expires_in <= 0 {
        return Err(OAuthError::InvalidExpires(payload.expires_in));
    }
    Ok(payload)
}

/// Expiry `expires_in` seconds from now; values chrono cannot represent are
/// rejected rather than overflowing.
fn expiry_after(expires_in: i64) -> Result<DateTime<Utc>, OAuthError> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or(OAuthError::InvalidExpires(expires_in))
}
