pub mod credential;
pub mod grant;
pub mod oauth;
pub mod persist;
pub mod store;

pub use credential::{
    Credential, DEFAULT_REFRESH_BUFFER, GMAIL_MODIFY_SCOPE, GMAIL_READONLY_SCOPE, GMAIL_SEND_SCOPE,
    REQUIRED_SCOPES, required_scopes,
};
pub use grant::{ClientSecrets, ClientSecretsError, GrantFlow, InstalledAppFlow};
pub use oauth::{AUTH_ENDPOINT, OAuthClient, OAuthError, TOKEN_ENDPOINT};
pub use persist::{FileTokenStore, MemoryTokenStore, TokenFileError, TokenStore};
pub use store::{AuthError, CredentialStore};
