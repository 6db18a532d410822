use thiserror::Error;

use crate::gmail::address::Mailbox;
use crate::gmail::mime::{normalize_message_id, reference_chain, split_references};
use crate::gmail::types::Message;

/// Headers requested when fetching the message being replied to.
pub const THREAD_HEADERS: [&str; 5] = ["Message-ID", "References", "In-Reply-To", "Subject", "From"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ThreadContextError {
    #[error("message {0} has no thread id")]
    MissingThread(String),
    #[error("message {0} has no parseable sender")]
    MissingSender(String),
}

/// Threading details of one message, derived from its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadContext {
    pub thread_id: String,
    pub message_id: Option<String>,
    pub references: Vec<String>,
    pub subject: Option<String>,
    pub sender: Mailbox,
}

impl ThreadContext {
    pub fn from_message(message: &Message) -> Result<Self, ThreadContextError> {
        let thread_id = message
            .thread_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ThreadContextError::MissingThread(message.id.clone()))?;
        let sender = message
            .header("From")
            .and_then(Mailbox::parse)
            .ok_or_else(|| ThreadContextError::MissingSender(message.id.clone()))?;
        let message_id = message.header("Message-ID").and_then(normalize_message_id);
        let references = match message.header("References").map(split_references) {
            Some(chain) if !chain.is_empty() => chain,
            _ => message_id.iter().cloned().collect(),
        };
        let subject = message
            .header("Subject")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            thread_id,
            message_id,
            references,
            subject,
            sender,
        })
    }

    pub fn reply_subject(&self) -> String {
        reply_subject(self.subject.as_deref())
    }

    /// `References` for a reply: the existing chain followed by the original id.
    pub fn reply_references(&self) -> Vec<String> {
        reference_chain(&self.references, self.message_id.as_deref())
    }
}

pub fn reply_subject(subject: Option<&str>) -> String {
    match subject {
        None => "Re: (no subject)".to_string(),
        Some(s) if s.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) => s.to_string(),
        Some(s) => format!("Re: {s}"),
    }
}
