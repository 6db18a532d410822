use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

mod registry;

pub use registry::ToolRegistry;

/// The fixed set of callable tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    SearchEmails,
    InspectEmail,
    SendEmail,
    ReplyEmail,
    MarkEmail,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::SearchEmails,
        ToolName::InspectEmail,
        ToolName::SendEmail,
        ToolName::ReplyEmail,
        ToolName::MarkEmail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchEmails => "SearchEmails",
            ToolName::InspectEmail => "InspectEmail",
            ToolName::SendEmail => "SendEmail",
            ToolName::ReplyEmail => "ReplyEmail",
            ToolName::MarkEmail => "MarkEmail",
        }
    }

    pub fn from_name(name: &str) -> Option<ToolName> {
        ToolName::ALL.into_iter().find(|tool| tool.as_str() == name)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller needs to decide whether and how to call a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool {tool} has an invalid input contract: {message}")]
    Schema { tool: ToolName, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_exactly() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::from_name(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolName::from_name("searchemails"), None);
        assert_eq!(ToolName::from_name("DeleteEmail"), None);
    }
}
