//! Interactive consent flow used when no refreshable credential exists.
//!
//! The installed-app flow binds a loopback listener, sends the user to Google's
//! consent page and waits for the single redirect that carries the
//! authorization code.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use super::credential::Credential;
use super::oauth::{AUTH_ENDPOINT, OAuthClient, OAuthError, exchange_code};

pub const CALLBACK_PATH: &str = "/oauth2callback";
pub const DEFAULT_GRANT_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_HTML: &str = r#"<!doctype html>
<html>
  <head><title>mailwright</title></head>
  <body style="font-family: sans-serif;">
    <h2>Gmail access granted</h2>
    <p>You can close this window and return to the terminal.</p>
  </body>
</html>
"#;

/// Produces a brand-new credential, usually with user interaction.
#[async_trait]
pub trait GrantFlow: Send + Sync {
    async fn grant(
        &self,
        http: &reqwest::Client,
        scopes: &BTreeSet<String>,
    ) -> Result<Credential, OAuthError>;
}

#[derive(Debug, Error)]
pub enum ClientSecretsError {
    #[error("failed to read client secrets {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("client secrets are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("client secrets contain neither an `installed` nor a `web` section")]
    MissingSection,
}

/// OAuth client registration as downloaded from the Google Cloud console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub auth_uri: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(contents: &str) -> Result<Self, ClientSecretsError> {
        let file: ClientSecretsFile = serde_json::from_str(contents)?;
        file.installed
            .or(file.web)
            .ok_or(ClientSecretsError::MissingSection)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientSecretsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ClientSecretsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }
}

/// Google's installed-application (loopback redirect) flow.
#[derive(Debug, Clone)]
pub struct InstalledAppFlow {
    client: OAuthClient,
    auth_endpoint: String,
    timeout: Duration,
    open_browser: bool,
}

impl InstalledAppFlow {
    pub fn new(client: OAuthClient) -> Self {
        Self {
            client,
            auth_endpoint: AUTH_ENDPOINT.to_string(),
            timeout: DEFAULT_GRANT_TIMEOUT,
            open_browser: true,
        }
    }

    pub fn with_auth_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.auth_endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }
}

#[async_trait]
impl GrantFlow for InstalledAppFlow {
    async fn grant(
        &self,
        http: &reqwest::Client,
        scopes: &BTreeSet<String>,
    ) -> Result<Credential, OAuthError> {
        let state = random_state();
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|err| OAuthError::Flow(format!("failed to bind callback listener: {err}")))?;
        let port = listener
            .local_addr()
            .map_err(|err| OAuthError::Flow(err.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}{CALLBACK_PATH}");

        let auth_url = build_auth_url(
            &self.auth_endpoint,
            &self.client.client_id,
            &redirect_uri,
            scopes,
            &state,
        )?;

        if self.open_browser {
            if let Err(err) = open_browser(auth_url.as_str()) {
                warn!(error = %err, "could not open browser automatically");
            }
        }
        // The user may need to copy the link by hand, so it goes to stderr as well.
        eprintln!("Authorize Gmail access by visiting:\n{auth_url}\n");
        info!(redirect_uri = %redirect_uri, "waiting for OAuth callback");

        let code = tokio::time::timeout(self.timeout, wait_for_code(listener, &state))
            .await
            .map_err(|_| OAuthError::CallbackTimeout)??;

        exchange_code(http, &self.client, &code, &redirect_uri, scopes).await
    }
}

fn random_state() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn build_auth_url(
    auth_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &BTreeSet<String>,
    state: &str,
) -> Result<Url, OAuthError> {
    let scope_value = scopes.iter().cloned().collect::<Vec<_>>().join(" ");
    Url::parse_with_params(
        auth_endpoint,
        [
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope_value.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ],
    )
    .map_err(|err| OAuthError::Flow(format!("invalid auth endpoint: {err}")))
}

async fn wait_for_code(listener: TcpListener, expected_state: &str) -> Result<String, OAuthError> {
    let (mut stream, _addr) = listener
        .accept()
        .await
        .map_err(|err| OAuthError::Flow(format!("callback accept failed: {err}")))?;

    let request = read_request_head(&mut stream).await?;
    let request_line = request.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();

    if method != "GET" {
        send_response(&mut stream, 405, "Only GET is supported").await;
        return Err(OAuthError::Flow("unexpected HTTP method on callback".into()));
    }

    let url = match Url::parse(&format!("http://localhost{target}")) {
        Ok(url) => url,
        Err(err) => {
            send_response(&mut stream, 400, "Malformed callback URL.").await;
            return Err(OAuthError::Flow(format!("malformed callback URL: {err}")));
        }
    };

    let mut code = None;
    let mut state = None;
    let mut denied = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => denied = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(reason) = denied {
        send_response(&mut stream, 400, "Authorization was not granted.").await;
        return Err(OAuthError::Flow(format!("consent denied: {reason}")));
    }

    if state.as_deref() != Some(expected_state) {
        send_response(&mut stream, 400, "State mismatch, please retry.").await;
        return Err(OAuthError::Flow("state mismatch on callback".into()));
    }

    match code {
        Some(code) if !code.is_empty() => {
            send_response(&mut stream, 200, SUCCESS_HTML).await;
            Ok(code)
        }
        _ => {
            send_response(&mut stream, 400, "Missing code in callback.").await;
            Err(OAuthError::Flow("missing code in callback".into()))
        }
    }
}

async fn read_request_head(stream: &mut TcpStream) -> Result<String, OAuthError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    while buf.len() <= 8192 {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|err| OAuthError::Flow(format!("callback read failed: {err}")))?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn send_response(stream: &mut TcpStream, status: u16, body: &str) {
    let status_line = match status {
        200 => "200 OK",
        405 => "405 Method Not Allowed",
        _ => "400 Bad Request",
    };
    let response = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    );
    // The browser may already be gone; the outcome is decided by the request.
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = Command::new("open");
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg("start").arg("");
        cmd
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = Command::new("xdg-open");

    let status = command.arg(url).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "browser command exited with status {status}"
        )))
    }
}
