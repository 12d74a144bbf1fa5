//! Conversation messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
    System,
}

/// A single exchanged message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
    /// Optional tag (command, result, challenge, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, message_type: Option<&str>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
            message_type: message_type.map(str::to_string),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content, Some("command"))
    }

    pub fn agent(content: impl Into<String>, message_type: &str) -> Self {
        Self::new(MessageRole::Agent, content, Some(message_type))
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content, None)
    }
}
