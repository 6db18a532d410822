use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
pub const GMAIL_MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// Scopes every operation in this crate may need. A credential must carry all
/// of them at once.
pub const REQUIRED_SCOPES: [&str; 3] = [GMAIL_READONLY_SCOPE, GMAIL_MODIFY_SCOPE, GMAIL_SEND_SCOPE];

pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::minutes(5);

pub fn required_scopes() -> BTreeSet<String> {
    REQUIRED_SCOPES.iter().map(|s| s.to_string()).collect()
}

/// An OAuth credential as persisted on disk.
///
/// `token` and `expiry` are accepted as aliases so files written by Google's
/// Python client libraries load without conversion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    #[serde(alias = "token")]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(alias = "expiry")]
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn needs_refresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now + buffer >= self.expires_at
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.trim().is_empty())
    }

    /// Scopes from `required` that this credential was not granted.
    pub fn missing_scopes(&self, required: &BTreeSet<String>) -> Vec<String> {
        required.difference(&self.scopes).cloned().collect()
    }

    pub fn covers(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.scopes)
    }

    /// True when the access token can be sent as-is.
    pub fn is_usable(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        !self.access_token.is_empty() && !self.needs_refresh(now, buffer)
    }
}

/// Parses the space separated `scope` value returned by Google's token endpoint.
pub fn parse_scope_list(value: &str) -> BTreeSet<String> {
    value.split_whitespace().map(|s| s.to_string()).collect()
}
