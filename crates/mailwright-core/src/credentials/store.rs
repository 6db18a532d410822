use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::credential::{Credential, DEFAULT_REFRESH_BUFFER, required_scopes};
use super::grant::GrantFlow;
use super::oauth::{OAuthClient, OAuthError, refresh_credential};
use super::persist::TokenStore;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to load stored credential: {0}")]
    Load(String),
    #[error("failed to persist credential: {0}")]
    Persist(String),
    #[error("credential refresh failed: {0}")]
    Refresh(#[source] OAuthError),
    #[error("authorization grant failed: {0}")]
    Grant(#[source] OAuthError),
    #[error("granted credential is missing scopes: {}", missing.join(", "))]
    InsufficientScopes { missing: Vec<String> },
    #[error("request rejected as unauthorized after obtaining a fresh credential")]
    Unauthorized,
}

/// Owns the lifecycle of the single OAuth credential.
///
/// All load/refresh/grant/persist work happens under one lock, so concurrent
/// callers never refresh twice or clobber each other's persisted token.
pub struct CredentialStore<S: TokenStore> {
    http: reqwest::Client,
    client: OAuthClient,
    required_scopes: BTreeSet<String>,
    refresh_buffer: Duration,
    token_store: Arc<S>,
    grant_flow: Arc<dyn GrantFlow>,
    current: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
}

enum Obtain {
    Cached,
    Forced,
    Grant,
}

impl<S: TokenStore> CredentialStore<S> {
    pub fn new(
        http: reqwest::Client,
        client: OAuthClient,
        token_store: Arc<S>,
        grant_flow: Arc<dyn GrantFlow>,
    ) -> Self {
        Self {
            http,
            client,
            required_scopes: required_scopes(),
            refresh_buffer: DEFAULT_REFRESH_BUFFER,
            token_store,
            grant_flow,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_required_scopes<I, T>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.required_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    pub fn required_scopes(&self) -> &BTreeSet<String> {
        &self.required_scopes
    }

    /// Returns a credential that covers every required scope and is not about
    /// to expire, refreshing or re-granting as needed.
    pub async fn acquire(&self) -> Result<Credential, AuthError> {
        if let Some(credential) = self.cached_usable().await {
            return Ok(credential);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(credential) = self.cached_usable().await {
            return Ok(credential);
        }
        self.obtain(Obtain::Cached).await
    }

    /// Called after the remote rejected `stale_access_token`. Refreshes unless
    /// another caller already replaced that token in the meantime.
    pub async fn refresh_after_rejection(
        &self,
        stale_access_token: &str,
    ) -> Result<Credential, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(credential) = self.current.read().await.as_ref() {
            if credential.access_token != stale_access_token
                && credential.is_usable(Utc::now(), self.refresh_buffer)
            {
                return Ok(credential.clone());
            }
        }
        self.obtain(Obtain::Forced).await
    }

    /// Discards whatever is stored and runs the grant flow.
    pub async fn regrant(&self) -> Result<Credential, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        self.obtain(Obtain::Grant).await
    }

    async fn cached_usable(&self) -> Option<Credential> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|c| c.is_usable(Utc::now(), self.refresh_buffer))
            .cloned()
    }

    // Caller must hold `refresh_lock`.
    async fn obtain(&self, mode: Obtain) -> Result<Credential, AuthError> {
        let candidate = match mode {
            Obtain::Grant => None,
            Obtain::Cached | Obtain::Forced => {
                let held = self.current.read().await.clone();
                let candidate = match held {
                    Some(credential) => Some(credential),
                    None => self.load_persisted().await?,
                };
                candidate.filter(|credential| self.scopes_cover(credential))
            }
        };

        let credential = match candidate {
            Some(credential)
                if matches!(mode, Obtain::Cached)
                    && credential.is_usable(Utc::now(), self.refresh_buffer) =>
            {
                *self.current.write().await = Some(credential.clone());
                return Ok(credential);
            }
            Some(credential) if credential.can_refresh() => {
                info!("refreshing expired Gmail credential");
                refresh_credential(&self.http, &self.client, &credential)
                    .await
                    .map_err(AuthError::Refresh)?
            }
            _ => {
                info!("no usable Gmail credential; starting authorization grant");
                self.grant_flow
                    .grant(&self.http, &self.required_scopes)
                    .await
                    .map_err(AuthError::Grant)?
            }
        };

        let missing = credential.missing_scopes(&self.required_scopes);
        if !missing.is_empty() {
            return Err(AuthError::InsufficientScopes { missing });
        }

        self.token_store
            .save_tokens(&credential)
            .await
            .map_err(|err| AuthError::Persist(err.to_string()))?;
        *self.current.write().await = Some(credential.clone());
        info!(expires_at = %credential.expires_at, "stored Gmail credential");

        Ok(credential)
    }

    async fn load_persisted(&self) -> Result<Option<Credential>, AuthError> {
        match self.token_store.load_tokens().await {
            Ok(credential) => Ok(credential),
            Err(err) => {
                // An unreadable token file is replaced by the next grant rather
                // than blocking every request.
                warn!(error = %err, "ignoring unreadable stored credential");
                Ok(None)
            }
        }
    }

    fn scopes_cover(&self, credential: &Credential) -> bool {
        let missing = credential.missing_scopes(&self.required_scopes);
        if missing.is_empty() {
            return true;
        }
        warn!(
            missing = ?missing,
            "stored credential does not cover required scopes; discarding it"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::credential::{GMAIL_READONLY_SCOPE, GMAIL_SEND_SCOPE};
    use crate::credentials::persist::MemoryTokenStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct CountingGrant {
        calls: AtomicUsize,
        scopes: BTreeSet<String>,
    }

    impl CountingGrant {
        fn granting(scopes: BTreeSet<String>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                scopes,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GrantFlow for CountingGrant {
        async fn grant(
            &self,
            _http: &reqwest::Client,
            _scopes: &BTreeSet<String>,
        ) -> Result<Credential, OAuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Credential {
                access_token: format!("granted_{n}"),
                refresh_token: Some("granted_refresh".into()),
                scopes: self.scopes.clone(),
                expires_at: Utc::now() + Duration::hours(1),
            })
        }
    }

    fn credential(access: &str, scopes: BTreeSet<String>, expires_in: Duration) -> Credential {
        Credential {
            access_token: access.into(),
            refresh_token: Some("refresh".into()),
            scopes,
            expires_at: Utc::now() + expires_in,
        }
    }

    fn store_with(
        server: Option<&MockServer>,
        tokens: Arc<MemoryTokenStore>,
        grant: Arc<CountingGrant>,
    ) -> CredentialStore<MemoryTokenStore> {
        let endpoint = server
            .map(|s| format!("{}/token", s.uri()))
            .unwrap_or_else(|| "http://127.0.0.1:9/token".into());
        CredentialStore::new(
            reqwest::Client::new(),
            OAuthClient::new("client", "secret").with_token_endpoint(endpoint),
            tokens,
            grant,
        )
    }

    async fn mount_refresh(server: &MockServer, access: &str, expect: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access,
                "expires_in": 3600,
            })))
            .expect(expect)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn valid_stored_credential_is_returned_without_writes() {
        let tokens = Arc::new(MemoryTokenStore::with_credential(credential(
            "stored",
            required_scopes(),
            Duration::hours(1),
        )));
        let grant = CountingGrant::granting(required_scopes());
        let store = store_with(None, tokens.clone(), grant.clone());

        let cred = store.acquire().await.expect("acquire");
        assert_eq!(cred.access_token, "stored");
        assert!(tokens.saved().await.is_empty());
        assert_eq!(grant.calls(), 0);
    }

    #[tokio::test]
    async fn under_scoped_credential_is_discarded_and_regranted() {
        let partial: BTreeSet<String> = [GMAIL_READONLY_SCOPE, GMAIL_SEND_SCOPE]
            .iter()
            .map(|s| s.to_string())
            .collect();
        // Valid and refreshable, yet it must never be reused.
        let tokens = Arc::new(MemoryTokenStore::with_credential(credential(
            "partial",
            partial,
            Duration::hours(1),
        )));
        let grant = CountingGrant::granting(required_scopes());
        let server = MockServer::start().await;
        mount_refresh(&server, "should_not_refresh", 0).await;
        let store = store_with(Some(&server), tokens.clone(), grant.clone());

        let cred = store.acquire().await.expect("acquire");
        assert_eq!(cred.access_token, "granted_1");
        assert_eq!(grant.calls(), 1);
        let saved = tokens.saved().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].access_token, "granted_1");
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_and_persisted() {
        let server = MockServer::start().await;
        mount_refresh(&server, "refreshed", 1).await;
        let tokens = Arc::new(MemoryTokenStore::with_credential(credential(
            "expired",
            required_scopes(),
            Duration::minutes(-10),
        )));
        let grant = CountingGrant::granting(required_scopes());
        let store = store_with(Some(&server), tokens.clone(), grant.clone());

        let cred = store.acquire().await.expect("acquire");
        assert_eq!(cred.access_token, "refreshed");
        assert_eq!(cred.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(grant.calls(), 0);
        assert_eq!(tokens.saved().await[0].access_token, "refreshed");
    }

    #[tokio::test]
    async fn expired_without_refresh_token_runs_grant() {
        let mut expired = credential("expired", required_scopes(), Duration::minutes(-10));
        expired.refresh_token = None;
        let tokens = Arc::new(MemoryTokenStore::with_credential(expired));
        let grant = CountingGrant::granting(required_scopes());
        let store = store_with(None, tokens.clone(), grant.clone());

        let cred = store.acquire().await.expect("acquire");
        assert_eq!(cred.access_token, "granted_1");
        assert_eq!(tokens.saved().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_store_runs_grant_once_then_caches() {
        let tokens = Arc::new(MemoryTokenStore::default());
        let grant = CountingGrant::granting(required_scopes());
        let store = store_with(None, tokens.clone(), grant.clone());

        let first = store.acquire().await.expect("first");
        let second = store.acquire().await.expect("second");
        assert_eq!(first, second);
        assert_eq!(grant.calls(), 1);
        assert_eq!(tokens.saved().await.len(), 1);
    }

    #[tokio::test]
    async fn grant_missing_scopes_is_rejected_and_not_persisted() {
        let tokens = Arc::new(MemoryTokenStore::default());
        let partial: BTreeSet<String> = [GMAIL_READONLY_SCOPE.to_string()].into_iter().collect();
        let grant = CountingGrant::granting(partial);
        let store = store_with(None, tokens.clone(), grant);

        let err = store.acquire().await.expect_err("scopes missing");
        match err {
            AuthError::InsufficientScopes { missing } => assert_eq!(missing.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(tokens.saved().await.is_empty());
    }

    #[tokio::test]
    async fn refresh_failure_surfaces_as_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .expect(1)
            .mount(&server)
            .await;
        let tokens = Arc::new(MemoryTokenStore::with_credential(credential(
            "expired",
            required_scopes(),
            Duration::minutes(-1),
        )));
        let grant = CountingGrant::granting(required_scopes());
        let store = store_with(Some(&server), tokens, grant.clone());

        let err = store.acquire().await.expect_err("refresh fails");
        assert!(matches!(err, AuthError::Refresh(OAuthError::TokenEndpoint { .. })));
        assert_eq!(grant.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_acquires_refresh_once() {
        let server = MockServer::start().await;
        mount_refresh(&server, "refreshed", 1).await;
        let tokens = Arc::new(MemoryTokenStore::with_credential(credential(
            "expired",
            required_scopes(),
            Duration::minutes(-1),
        )));
        let grant = CountingGrant::granting(required_scopes());
        let store = Arc::new(store_with(Some(&server), tokens.clone(), grant));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.acquire().await })
            })
            .collect();
        for handle in handles {
            let cred = handle.await.unwrap().expect("acquire");
            assert_eq!(cred.access_token, "refreshed");
        }
        assert_eq!(tokens.saved().await.len(), 1);
    }

    #[tokio::test]
    async fn refresh_after_rejection_skips_when_token_already_replaced() {
        let server = MockServer::start().await;
        mount_refresh(&server, "forced", 1).await;
        let tokens = Arc::new(MemoryTokenStore::with_credential(credential(
            "current",
            required_scopes(),
            Duration::hours(1),
        )));
        let grant = CountingGrant::granting(required_scopes());
        let store = store_with(Some(&server), tokens.clone(), grant);

        store.acquire().await.expect("prime cache");
        let unchanged = store
            .refresh_after_rejection("some_older_token")
            .await
            .expect("no refresh needed");
        assert_eq!(unchanged.access_token, "current");

        let forced = store
            .refresh_after_rejection("current")
            .await
            .expect("forced refresh");
        assert_eq!(forced.access_token, "forced");
        assert_eq!(tokens.saved().await.len(), 1);
    }

    #[tokio::test]
    async fn regrant_ignores_valid_credential() {
        let tokens = Arc::new(MemoryTokenStore::with_credential(credential(
            "stored",
            required_scopes(),
            Duration::hours(1),
        )));
        let grant = CountingGrant::granting(required_scopes());
        let store = store_with(None, tokens.clone(), grant.clone());

        let cred = store.regrant().await.expect("regrant");
        assert_eq!(cred.access_token, "granted_1");
        assert_eq!(store.acquire().await.unwrap().access_token, "granted_1");
        assert_eq!(grant.calls(), 1);
    }
}
