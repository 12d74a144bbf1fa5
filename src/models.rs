//! Core data models for the command gateway

use crate::error::{CommandError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

//
// ================= Command =================
//

/// A command string after tokenization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedCommand {
    pub resource: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub flags: Map<String, Value>,
}

impl ParsedCommand {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            id: None,
            flags: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_flag(mut self, name: impl Into<String>, value: Value) -> Self {
        self.flags.insert(name.into(), value);
        self
    }

    /// `resource.action` routing key, lowercased and trimmed.
    pub fn route_key(&self) -> String {
        format!("{}.{}", normalize(&self.resource), normalize(&self.action))
    }
}

impl fmt::Display for ParsedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.resource, self.action)?;
        if let Some(id) = &self.id {
            write!(f, " {}", id)?;
        }
        for (name, value) in &self.flags {
            match value {
                Value::Bool(true) => write!(f, " --{}", name)?,
                Value::String(s) => write!(f, " --{} {}", name, s)?,
                other => write!(f, " --{} {}", name, other)?,
            }
        }
        Ok(())
    }
}

pub(crate) fn normalize(token: &str) -> String {
    token.trim().to_lowercase()
}

//
// ================= Credential =================
//

/// Opaque credential handed to the transport. Never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

//
// ================= Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureDetail {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl From<&CommandError> for FailureDetail {
    fn from(err: &CommandError) -> Self {
        let hint = match err {
            CommandError::UnknownCommand { catalog, .. } => Some(catalog.clone()),
            CommandError::NoPendingAction(_) => {
                Some("Propose a sensitive command before verifying or confirming it.".to_string())
            }
            CommandError::InvalidCodeFormat => {
                Some("Ask for the six-digit code again; the staged action is still pending.".to_string())
            }
            _ => None,
        };

        Self {
            kind: err.kind(),
            message: err.to_string(),
            hint,
        }
    }
}

/// Outcome of dispatching one command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

impl CommandResult {
    pub fn ok(status: Option<u16>, data: Value) -> Self {
        Self {
            success: true,
            status,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(err: CommandError) -> Self {
        let (status, data) = match &err {
            CommandError::RemoteExecutionFailure { status, body } => {
                (Some(*status), Some(body.clone()))
            }
            _ => (None, None),
        };

        Self {
            success: false,
            status,
            data,
            error: Some(FailureDetail::from(&err)),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// One-line description for conversation history and CLI output.
    pub fn summary(&self) -> String {
        match (&self.error, self.status) {
            (Some(err), _) => format!("failed ({}): {}", err.kind.as_str(), err.message),
            (None, Some(status)) => format!("succeeded with status {}", status),
            (None, None) => "succeeded".to_string(),
        }
    }
}
