//! Wiring from [`GmailConfig`] to a ready [`MailOperations`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::GmailConfig;
use crate::credentials::{
    AUTH_ENDPOINT, ClientSecrets, ClientSecretsError, CredentialStore, FileTokenStore,
    InstalledAppFlow, OAuthClient, TOKEN_ENDPOINT,
};
use crate::gmail::GmailClient;
use crate::operations::MailOperations;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no OAuth client configured: {0}")]
    ClientSecrets(#[from] ClientSecretsError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

pub fn http_client(config: &GmailConfig) -> Result<reqwest::Client, SetupError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(concat!("mailwright/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// OAuth client plus consent endpoint. Explicit client id and secret win over
/// the client secrets file, which is only read when one of them is missing.
pub fn oauth_client(config: &GmailConfig) -> Result<(OAuthClient, String), SetupError> {
    let (client_id, client_secret, file_auth, file_token) =
        match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) => (id.clone(), secret.clone(), None, None),
            _ => {
                let secrets = ClientSecrets::from_file(&config.client_secrets_path)?;
                (
                    config.client_id.clone().unwrap_or(secrets.client_id),
                    config.client_secret.clone().unwrap_or(secrets.client_secret),
                    secrets.auth_uri,
                    secrets.token_uri,
                )
            }
        };

    let token_endpoint = config
        .token_endpoint
        .clone()
        .or(file_token)
        .unwrap_or_else(|| TOKEN_ENDPOINT.to_string());
    let auth_endpoint = config
        .auth_endpoint
        .clone()
        .or(file_auth)
        .unwrap_or_else(|| AUTH_ENDPOINT.to_string());

    Ok((
        OAuthClient::new(client_id, client_secret).with_token_endpoint(token_endpoint),
        auth_endpoint,
    ))
}

pub fn credential_store(
    config: &GmailConfig,
    http: reqwest::Client,
) -> Result<CredentialStore<FileTokenStore>, SetupError> {
    let (client, auth_endpoint) = oauth_client(config)?;
    let flow = InstalledAppFlow::new(client.clone())
        .with_auth_endpoint(auth_endpoint)
        .with_timeout(Duration::from_secs(config.grant_timeout_secs))
        .with_open_browser(config.open_browser);

    Ok(CredentialStore::new(
        http,
        client,
        Arc::new(FileTokenStore::new(&config.token_path)),
        Arc::new(flow),
    )
    .with_refresh_buffer(chrono::Duration::seconds(config.refresh_buffer_secs)))
}

pub fn mail_operations(config: &GmailConfig) -> Result<MailOperations<FileTokenStore>, SetupError> {
    let http = http_client(config)?;
    let store = credential_store(config, http.clone())?;
    let gmail = GmailClient::new(http, Arc::new(store))
        .with_api_base(config.api_base.as_str())
        .with_user_id(config.user_id.as_str());
    Ok(MailOperations::new(gmail))
}
