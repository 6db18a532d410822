pub mod address;
pub mod client;
pub mod labels;
pub mod mime;
pub mod query;
pub mod thread;
pub mod types;

pub use address::{Mailbox, TextBodies, extract_text_bodies, parse_mailbox_list};
pub use client::{DEFAULT_API_BASE, GmailClient, GmailClientError};
pub use labels::{LabelChange, LabelPlan, plan_label_change};
pub use mime::{BodyFormat, MimeBuildError, OutgoingMessage};
pub use query::{DEFAULT_QUERY, with_days_back};
pub use thread::{ThreadContext, ThreadContextError};
pub use types::{
    ListMessagesResponse, Message, MessageFormat, MessagePart, MessagePartBody, MessageRef,
    ModifyMessageRequest, SendMessageRequest,
};
