use crate::credentials::TokenStore;
use crate::gmail::GmailClient;

pub mod error;
mod inspect;
pub mod locks;
mod mark;
mod reply;
pub mod requests;
pub mod result;
mod search;
mod send;

pub use error::OperationError;
pub use locks::MessageLocks;
pub use requests::{InspectEmail, MarkEmail, ReplyEmail, SearchEmails, SendEmail};
pub use result::{
    EmailSummary, InspectedMessage, LabelUpdate, OperationResult, OperationStatus, Payload,
    SentMessage,
};

/// The mail operations exposed as tools. Each call is a short sequence of
/// Gmail round-trips that ends in an [`OperationResult`].
pub struct MailOperations<S: TokenStore> {
    gmail: GmailClient<S>,
    locks: MessageLocks,
}

impl<S: TokenStore> MailOperations<S> {
    pub fn new(gmail: GmailClient<S>) -> Self {
        Self {
            gmail,
            locks: MessageLocks::new(),
        }
    }

    pub fn gmail(&self) -> &GmailClient<S> {
        &self.gmail
    }
}

/// Gmail message ids are opaque but only ever use `[A-Za-z0-9_-]`; anything
/// else is rejected before it can reach a request path.
fn require_message_id(message_id: &str) -> Result<&str, OperationError> {
    let trimmed = message_id.trim();
    if trimmed.is_empty() {
        return Err(OperationError::schema("message_id must not be empty"));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(OperationError::schema(format!(
            "message_id `{trimmed}` may only contain letters, digits, `_` and `-`"
        )));
    }
    Ok(trimmed)
}
