use tracing::{info, instrument};

use crate::credentials::TokenStore;
use crate::gmail::address::{Mailbox, parse_mailbox_list};
use crate::gmail::mime::{BodyFormat, MimeBuildError, OutgoingMessage};

use super::requests::SendEmail;
use super::result::{OperationResult, Payload, SentMessage};
use super::{MailOperations, OperationError};

impl<S: TokenStore> MailOperations<S> {
    #[instrument(skip(self, request), fields(to = %request.to, format = %request.format))]
    pub async fn send(&self, request: SendEmail) -> Result<OperationResult, OperationError> {
        let format: BodyFormat = request.format.parse().map_err(OperationError::Schema)?;
        let to = recipients("to", Some(request.to.as_str()))?;
        if to.is_empty() {
            return Err(OperationError::schema("`to` must contain at least one address"));
        }
        let message = OutgoingMessage {
            to,
            cc: recipients("cc", request.cc.as_deref())?,
            bcc: recipients("bcc", request.bcc.as_deref())?,
            subject: request.subject,
            body: request.body,
            format,
            ..OutgoingMessage::default()
        };

        let raw = message.to_base64_url().map_err(build_error)?;
        let sent = self
            .gmail
            .send_message(raw, None)
            .await
            .map_err(OperationError::from_send)?;

        info!(sent_id = %sent.id, status = "success", "message sent");
        Ok(OperationResult::Success(Payload::Sent(SentMessage {
            id: sent.id,
            thread_id: sent.thread_id,
        })))
    }
}

/// Parses one address field; a non-blank field with no usable address is
/// rejected rather than silently dropped.
pub(super) fn recipients(field: &str, value: Option<&str>) -> Result<Vec<Mailbox>, OperationError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(Vec::new());
    };
    let parsed = parse_mailbox_list(value);
    if parsed.is_empty() {
        return Err(OperationError::schema(format!(
            "`{field}` has no valid email address: {value}"
        )));
    }
    Ok(parsed)
}

pub(super) fn build_error(err: MimeBuildError) -> OperationError {
    OperationError::schema(format!("could not build message: {err}"))
}
