use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::gmail::query::DEFAULT_QUERY;

pub const DEFAULT_MAX_RESULTS: u32 = 5;
/// Largest page `users.messages.list` returns.
pub const MAX_SEARCH_RESULTS: u32 = 500;

fn default_query() -> String {
    DEFAULT_QUERY.to_string()
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

fn default_inspect_format() -> String {
    "full".to_string()
}

fn default_body_format() -> String {
    "plain".to_string()
}

/// Search the mailbox with a Gmail query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchEmails {
    /// Gmail search syntax, e.g. `from:alice is:unread`.
    #[serde(default = "default_query")]
    pub query: String,
    /// Number of messages to return, 1 to 500.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Only include messages received within this many days.
    #[serde(default)]
    pub days_back: Option<u32>,
}

impl Default for SearchEmails {
    fn default() -> Self {
        Self {
            query: default_query(),
            max_results: DEFAULT_MAX_RESULTS,
            days_back: None,
        }
    }
}

/// Fetch one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct InspectEmail {
    pub message_id: String,
    /// One of `full`, `metadata`, `minimal` or `raw`.
    #[serde(default = "default_inspect_format")]
    pub format: String,
}

/// Compose and send a new message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SendEmail {
    /// Comma-separated recipients.
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Comma-separated carbon-copy recipients.
    #[serde(default)]
    pub cc: Option<String>,
    /// Comma-separated blind carbon-copy recipients.
    #[serde(default)]
    pub bcc: Option<String>,
    /// `plain` or `html`.
    #[serde(default = "default_body_format")]
    pub format: String,
}

/// Reply to the sender of a message inside its thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReplyEmail {
    pub message_id: String,
    pub body: String,
    /// Label ids to add to the sent reply.
    #[serde(default)]
    pub add_label_ids: Option<Vec<String>>,
    /// Label ids to remove from the sent reply.
    #[serde(default)]
    pub remove_label_ids: Option<Vec<String>>,
}

/// Change labels on a message. `READ` in `add_labels` marks it read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MarkEmail {
    pub message_id: String,
    #[serde(default)]
    pub add_labels: Option<Vec<String>>,
    #[serde(default)]
    pub remove_labels: Option<Vec<String>>,
}
