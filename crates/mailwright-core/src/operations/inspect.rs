use tracing::{info, instrument};

use crate::credentials::TokenStore;
use crate::gmail::address::extract_text_bodies;
use crate::gmail::types::MessageFormat;

use super::requests::InspectEmail;
use super::result::{InspectedMessage, OperationResult, Payload};
use super::{MailOperations, OperationError, require_message_id};

impl<S: TokenStore> MailOperations<S> {
    #[instrument(skip(self, request), fields(message_id = %request.message_id, format = %request.format))]
    pub async fn inspect(&self, request: InspectEmail) -> Result<OperationResult, OperationError> {
        let format: MessageFormat = request.format.parse().map_err(OperationError::Schema)?;
        let message_id = require_message_id(&request.message_id)?;

        let message = self.gmail.get_message(message_id, format, &[]).await?;
        let body = message
            .payload
            .as_ref()
            .map(extract_text_bodies)
            .unwrap_or_default();

        info!(status = "success", labels = message.label_ids.len(), "message inspected");
        Ok(OperationResult::Success(Payload::Message(InspectedMessage {
            id: message.id,
            thread_id: message.thread_id,
            format,
            snippet: message.snippet.unwrap_or_default(),
            label_ids: message.label_ids,
            payload: message.payload,
            raw: message.raw,
            body,
        })))
    }
}
