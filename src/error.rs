//! Error types for the financial command gateway

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Operational failures. These never describe the outcome of a command;
/// command outcomes travel as [`CommandError`] inside a `CommandResult`.
#[derive(Error, Debug)]
pub enum GatewayError {

    // =============================
    // Core Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid route table: {0}")]
    InvalidRouteTable(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(Uuid),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Machine-checkable failure kind carried by every failed command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownCommand,
    MissingPositionalArgument,
    NoPendingAction,
    InvalidCodeFormat,
    ActionSuperseded,
    RemoteExecutionFailure,
    TransportFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownCommand => "unknown_command",
            ErrorKind::MissingPositionalArgument => "missing_positional_argument",
            ErrorKind::NoPendingAction => "no_pending_action",
            ErrorKind::InvalidCodeFormat => "invalid_code_format",
            ErrorKind::ActionSuperseded => "action_superseded",
            ErrorKind::RemoteExecutionFailure => "remote_execution_failure",
            ErrorKind::TransportFailure => "transport_failure",
        }
    }

    /// Whether a caller can recover by supplying more or corrected input
    /// rather than reporting a hard failure.
    pub fn needs_caller_input(&self) -> bool {
        matches!(
            self,
            ErrorKind::UnknownCommand
                | ErrorKind::MissingPositionalArgument
                | ErrorKind::InvalidCodeFormat
                | ErrorKind::NoPendingAction
                | ErrorKind::ActionSuperseded
        )
    }
}

/// Failure of a single command, as seen by the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Unknown command '{command}'")]
    UnknownCommand { command: String, catalog: String },

    #[error("'{command}' requires a positional <{placeholder}> argument")]
    MissingPositionalArgument { command: String, placeholder: String },

    #[error("No pending action to confirm in conversation {0}")]
    NoPendingAction(Uuid),

    #[error("Invalid code format: expected exactly six digits")]
    InvalidCodeFormat,

    #[error("Staged action {expected} was replaced by {current} before confirmation")]
    ActionSuperseded { expected: Uuid, current: Uuid },

    #[error("Remote call failed with status {status}")]
    RemoteExecutionFailure { status: u16, body: serde_json::Value },

    #[error("Transport failure: {0}")]
    TransportFailure(String),
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::UnknownCommand { .. } => ErrorKind::UnknownCommand,
            CommandError::MissingPositionalArgument { .. } => ErrorKind::MissingPositionalArgument,
            CommandError::NoPendingAction(_) => ErrorKind::NoPendingAction,
            CommandError::InvalidCodeFormat => ErrorKind::InvalidCodeFormat,
            CommandError::ActionSuperseded { .. } => ErrorKind::ActionSuperseded,
            CommandError::RemoteExecutionFailure { .. } => ErrorKind::RemoteExecutionFailure,
            CommandError::TransportFailure(_) => ErrorKind::TransportFailure,
        }
    }
}
