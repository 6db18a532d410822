use std::sync::Arc;

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::credentials::{AuthError, CredentialStore, TokenStore};
use crate::gmail::types::{
    ListMessagesResponse, Message, MessageFormat, MessageRef, ModifyMessageRequest,
    SendMessageRequest,
};

pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users";

#[derive(Debug, Error)]
pub enum GmailClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("authorization error: {0}")]
    Auth(#[from] AuthError),
    #[error("gmail api error {status}: {detail}")]
    Remote { status: u16, detail: String },
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cannot build request url: {0}")]
    InvalidUrl(String),
}

impl GmailClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GmailClientError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub struct GmailClient<S: TokenStore> {
    http: Client,
    user_id: String,
    api_base: String,
    credentials: Arc<CredentialStore<S>>,
}

impl<S: TokenStore> GmailClient<S> {
    pub fn new(http: Client, credentials: Arc<CredentialStore<S>>) -> Self {
        Self {
            http,
            user_id: "me".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            credentials,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn credentials(&self) -> &Arc<CredentialStore<S>> {
        &self.credentials
    }

    pub async fn list_messages(
        &self,
        query: Option<&str>,
        page_token: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<ListMessagesResponse, GmailClientError> {
        let url = self.endpoint(&["messages"])?;
        self.send_json(|| {
            let mut builder = self.http.get(url.clone());
            if let Some(q) = query {
                builder = builder.query(&[("q", q)]);
            }
            if let Some(token) = page_token {
                builder = builder.query(&[("pageToken", token)]);
            }
            if let Some(max) = max_results {
                builder = builder.query(&[("maxResults", max)]);
            }
            builder
        })
        .await
    }

    /// Fetches one message. `metadata_headers` restricts the headers returned
    /// when `format` is [`MessageFormat::Metadata`].
    pub async fn get_message(
        &self,
        message_id: &str,
        format: MessageFormat,
        metadata_headers: &[&str],
    ) -> Result<Message, GmailClientError> {
        let url = self.endpoint(&["messages", message_id])?;
        self.send_json(|| {
            let mut builder = self.http.get(url.clone()).query(&[("format", format.as_str())]);
            if format == MessageFormat::Metadata {
                for header in metadata_headers {
                    builder = builder.query(&[("metadataHeaders", *header)]);
                }
            }
            builder
        })
        .await
    }

    /// Submits a base64url encoded RFC 5322 document, optionally into an
    /// existing thread.
    pub async fn send_message(
        &self,
        raw: String,
        thread_id: Option<String>,
    ) -> Result<MessageRef, GmailClientError> {
        let url = self.endpoint(&["messages", "send"])?;
        let body = SendMessageRequest { raw, thread_id };
        self.send_json(|| self.http.post(url.clone()).json(&body)).await
    }

    pub async fn modify_message(
        &self,
        message_id: &str,
        add_label_ids: Vec<String>,
        remove_label_ids: Vec<String>,
    ) -> Result<Message, GmailClientError> {
        let url = self.endpoint(&["messages", message_id, "modify"])?;
        let body = ModifyMessageRequest {
            add_label_ids,
            remove_label_ids,
        };
        self.send_json(|| self.http.post(url.clone()).json(&body)).await
    }

    /// `{api_base}/{user_id}/{segments..}` with every segment percent-encoded,
    /// so ids cannot add path components or climb out of the user's resource.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GmailClientError> {
        if let Some(bad) = std::iter::once(self.user_id.as_str())
            .chain(segments.iter().copied())
            .find(|segment| segment.is_empty() || *segment == "." || *segment == "..")
        {
            return Err(GmailClientError::InvalidUrl(format!(
                "invalid path segment `{bad}`"
            )));
        }

        let mut url = Url::parse(&self.api_base)
            .map_err(|err| GmailClientError::InvalidUrl(format!("{}: {err}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|_| GmailClientError::InvalidUrl(self.api_base.clone()))?
            .pop_if_empty()
            .push(&self.user_id)
            .extend(segments);
        Ok(url)
    }

    async fn send_json<T, B>(&self, build: B) -> Result<T, GmailClientError>
    where
        T: DeserializeOwned,
        B: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let response = self.perform_authenticated(build).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(GmailClientError::Decode)
    }

    async fn perform_authenticated<B>(
        &self,
        build: B,
    ) -> Result<reqwest::Response, GmailClientError>
    where
        B: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let credential = self.credentials.acquire().await?;
        let mut response = build()
            .bearer_auth(&credential.access_token)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("gmail rejected access token; refreshing once");
            let credential = self
                .credentials
                .refresh_after_rejection(&credential.access_token)
                .await?;
            response = build()
                .bearer_auth(&credential.access_token)
                .send()
                .await?;
        }

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthorized.into());
        }
        if !status.is_success() {
            let detail = error_detail(status.as_u16(), response.text().await);
            return Err(GmailClientError::Remote {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(response)
    }
}

/// The error body verbatim, or a note saying why it could not be read.
fn error_detail<E: std::fmt::Display>(status: u16, body: Result<String, E>) -> String {
    match body {
        Ok(body) => body,
        Err(err) => {
            warn!(status, error = %err, "failed to read gmail error body");
            format!("(response body unreadable: {err})")
        }
    }
}
