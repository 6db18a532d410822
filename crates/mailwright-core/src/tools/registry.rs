use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::credentials::TokenStore;
use crate::operations::{
    InspectEmail, MailOperations, MarkEmail, OperationError, OperationResult, ReplyEmail,
    SearchEmails, SendEmail,
};

use super::{ToolDefinition, ToolError, ToolName};

/// Tool contracts plus dispatch into [`MailOperations`]. Holds no state
/// beyond the rendered definitions.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Renders every input schema and checks each tool's sample arguments
    /// against its input type.
    pub fn new() -> Result<Self, ToolError> {
        let definitions = ToolName::ALL
            .into_iter()
            .map(definition)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { definitions })
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|def| def.name == name)
    }

    /// Validates `arguments` against the named tool and runs it. Unknown tools
    /// and malformed arguments fail before any remote call.
    #[instrument(skip(self, ops, arguments))]
    pub async fn invoke<S: TokenStore>(
        &self,
        ops: &MailOperations<S>,
        name: &str,
        arguments: Value,
    ) -> Result<OperationResult, OperationError> {
        let tool = ToolName::from_name(name)
            .ok_or_else(|| OperationError::schema(format!("unknown tool `{name}`")))?;
        // A call without arguments means "all defaults".
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        debug!(%tool, "dispatching tool call");

        match tool {
            ToolName::SearchEmails => ops.search(parse_arguments(tool, arguments)?).await,
            ToolName::InspectEmail => ops.inspect(parse_arguments(tool, arguments)?).await,
            ToolName::SendEmail => ops.send(parse_arguments(tool, arguments)?).await,
            ToolName::ReplyEmail => ops.reply(parse_arguments(tool, arguments)?).await,
            ToolName::MarkEmail => ops.mark_labels(parse_arguments(tool, arguments)?).await,
        }
    }
}

fn parse_arguments<T: DeserializeOwned>(tool: ToolName, arguments: Value) -> Result<T, OperationError> {
    serde_json::from_value(arguments)
        .map_err(|err| OperationError::schema(format!("invalid arguments for {tool}: {err}")))
}

fn definition(tool: ToolName) -> Result<ToolDefinition, ToolError> {
    match tool {
        ToolName::SearchEmails => build::<SearchEmails>(
            tool,
            "List messages matching a Gmail search query, newest first. \
             Pass `days_back` to restrict results to the last N days.",
            &[
                json!({}),
                json!({ "query": "from:alice is:unread", "max_results": 10, "days_back": 7 }),
            ],
        ),
        ToolName::InspectEmail => build::<InspectEmail>(
            tool,
            "Fetch a single message by message_id, including headers, label ids \
             and decoded text bodies.",
            &[
                json!({ "message_id": "18c2f0a1b2c3d4e5" }),
                json!({ "message_id": "18c2f0a1b2c3d4e5", "format": "metadata" }),
            ],
        ),
        ToolName::SendEmail => build::<SendEmail>(
            tool,
            "Send a new email. Provide `to`, `subject` and `body`, with optional \
             comma-separated `cc` and `bcc`. `format` is `plain` or `html`.",
            &[json!({
                "to": "alice@example.com, \"Lee, Sam\" <sam@example.com>",
                "subject": "Status",
                "body": "<p>All green.</p>",
                "cc": "team@example.com",
                "format": "html"
            })],
        ),
        ToolName::ReplyEmail => build::<ReplyEmail>(
            tool,
            "Reply to the sender of a message inside its thread, as plain text. \
             Label ids may be added to or removed from the sent reply.",
            &[json!({
                "message_id": "18c2f0a1b2c3d4e5",
                "body": "Hi Sam,\n\nThanks for the update.\n\nBest regards",
                "add_label_ids": ["IMPORTANT"]
            })],
        ),
        ToolName::MarkEmail => build::<MarkEmail>(
            tool,
            "Add or remove labels on a message. Add `READ` (or remove `UNREAD`) to \
             mark it read; add `UNREAD` to mark it unread. Labels such as `STARRED` \
             and `IMPORTANT` also work.",
            &[
                json!({ "message_id": "18c2f0a1b2c3d4e5", "add_labels": ["READ"] }),
                json!({ "message_id": "18c2f0a1b2c3d4e5", "remove_labels": ["INBOX"] }),
            ],
        ),
    }
}

fn build<T>(tool: ToolName, description: &str, examples: &[Value]) -> Result<ToolDefinition, ToolError>
where
    T: JsonSchema + DeserializeOwned,
{
    let schema = schemars::schema_for!(T);
    let input_schema = serde_json::to_value(&schema).map_err(|err| ToolError::Schema {
        tool,
        message: err.to_string(),
    })?;

    for example in examples {
        serde_json::from_value::<T>(example.clone()).map_err(|err| ToolError::Schema {
            tool,
            message: format!("example {example} does not match the input type: {err}"),
        })?;
    }

    Ok(ToolDefinition {
        name: tool.as_str().to_string(),
        description: description.to_string(),
        input_schema,
    })
}
