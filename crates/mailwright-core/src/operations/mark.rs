use tracing::{info, instrument};

use crate::credentials::TokenStore;
use crate::gmail::labels::{LabelChange, LabelPlan, plan_label_change};
use crate::gmail::types::MessageFormat;

use super::requests::MarkEmail;
use super::result::{LabelUpdate, OperationResult, Payload};
use super::{MailOperations, OperationError, require_message_id};

impl<S: TokenStore> MailOperations<S> {
    #[instrument(skip(self, request), fields(message_id = %request.message_id))]
    pub async fn mark_labels(&self, request: MarkEmail) -> Result<OperationResult, OperationError> {
        let message_id = require_message_id(&request.message_id)?;
        let change = LabelChange::normalized(
            request.add_labels.as_deref().unwrap_or_default(),
            request.remove_labels.as_deref().unwrap_or_default(),
        );
        if change.is_empty() {
            info!(status = "skipped", "no label changes requested");
            return Ok(OperationResult::skipped("no label changes requested"));
        }

        let _guard = self.locks.lock(message_id).await;
        let current = self
            .gmail
            .get_message(message_id, MessageFormat::Minimal, &[])
            .await?;

        match plan_label_change(change, &current.label_ids) {
            LabelPlan::Skip(reason) => {
                info!(status = "skipped", %reason, "label change is a no-op");
                Ok(OperationResult::skipped(reason))
            }
            LabelPlan::Apply(change) => {
                let updated = self
                    .gmail
                    .modify_message(message_id, change.add, change.remove)
                    .await?;
                info!(status = "success", labels = ?updated.label_ids, "labels updated");
                Ok(OperationResult::Success(Payload::Labels(LabelUpdate {
                    id: updated.id,
                    label_ids: updated.label_ids,
                })))
            }
        }
    }
}
