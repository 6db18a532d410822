pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod gmail;
pub mod operations;
pub mod telemetry;
pub mod tools;

pub use bootstrap::{SetupError, mail_operations};
pub use config::{Config, ConfigError};
pub use credentials::{AuthError, Credential, CredentialStore, FileTokenStore, TokenStore};
pub use gmail::{GmailClient, GmailClientError};
pub use operations::{MailOperations, OperationError, OperationResult, OperationStatus};
pub use telemetry::{TelemetryError, TelemetryGuard, init_logging, init_telemetry};
pub use tools::{ToolDefinition, ToolError, ToolName, ToolRegistry};
