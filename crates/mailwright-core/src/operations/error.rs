use thiserror::Error;

use crate::credentials::AuthError;
use crate::gmail::client::GmailClientError;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),
    #[error("gmail rejected the request ({status}): {detail}")]
    Remote { status: u16, detail: String },
    #[error("request did not complete: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid input: {0}")]
    Schema(String),
    #[error("gmail rejected the outgoing message ({status}): {detail}")]
    Send { status: u16, detail: String },
    #[error("reply {reply_id} was sent but its labels could not be updated: {source}")]
    ReplyLabels {
        reply_id: String,
        source: Box<OperationError>,
    },
    #[error("unexpected response from gmail: {0}")]
    Decode(String),
}

impl OperationError {
    pub fn schema(message: impl Into<String>) -> Self {
        OperationError::Schema(message.into())
    }

    /// Only transport failures may succeed on a plain retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OperationError::Transport(_))
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            OperationError::Auth(_) => "auth",
            OperationError::Remote { .. } => "remote",
            OperationError::Transport(_) => "transport",
            OperationError::Schema(_) => "schema",
            OperationError::Send { .. } => "send",
            OperationError::ReplyLabels { .. } => "reply_labels",
            OperationError::Decode(_) => "decode",
        }
    }

    /// Maps a failed `messages.send` call, where a remote rejection is a
    /// rejected document rather than a generic API error.
    pub(crate) fn from_send(err: GmailClientError) -> Self {
        match err {
            GmailClientError::Remote { status, detail } => OperationError::Send { status, detail },
            other => other.into(),
        }
    }
}

impl From<GmailClientError> for OperationError {
    fn from(err: GmailClientError) -> Self {
        match err {
            GmailClientError::Auth(err) => OperationError::Auth(err),
            GmailClientError::Remote { status, detail } => OperationError::Remote { status, detail },
            GmailClientError::Transport(err) => OperationError::Transport(err),
            GmailClientError::Decode(err) => OperationError::Decode(err.to_string()),
            GmailClientError::InvalidUrl(detail) => OperationError::Schema(detail),
        }
    }
}
