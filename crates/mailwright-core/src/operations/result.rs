use serde::Serialize;

use crate::gmail::address::TextBodies;
use crate::gmail::types::{MessageFormat, MessagePart};

/// Outcome tag of an operation, for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    NoResults,
    Skipped,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "success",
            OperationStatus::NoResults => "no_results",
            OperationStatus::Skipped => "skipped",
        }
    }
}

/// Result of one mail operation. Serializes with a `status` field carrying
/// the tag and the payload fields alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationResult {
    Success(Payload),
    NoResults { emails: Vec<EmailSummary> },
    Skipped { reason: String },
}

impl OperationResult {
    pub fn no_results() -> Self {
        OperationResult::NoResults { emails: Vec::new() }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        OperationResult::Skipped {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> OperationStatus {
        match self {
            OperationResult::Success(_) => OperationStatus::Success,
            OperationResult::NoResults { .. } => OperationStatus::NoResults,
            OperationResult::Skipped { .. } => OperationStatus::Skipped,
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            OperationResult::Success(payload) => Some(payload),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Emails { emails: Vec<EmailSummary> },
    Message(InspectedMessage),
    Sent(SentMessage),
    Labels(LabelUpdate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailSummary {
    pub id: String,
    pub thread_id: Option<String>,
    pub from: String,
    pub subject: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InspectedMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub format: MessageFormat,
    pub snippet: String,
    pub label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<MessagePart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "TextBodies::is_empty")]
    pub body: TextBodies,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub id: String,
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelUpdate {
    pub id: String,
    pub label_ids: Vec<String>,
}
