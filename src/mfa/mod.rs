//! MFA gate
//!
//! Sensitive commands are staged instead of executed. The caller asks for a
//! passcode, then confirms with it; the staged action is taken out of the
//! conversation slot before it is replayed, so it runs at most once.
//!
//! IDLE -> STAGED (propose) -> EXECUTED (confirm, slot cleared)
//! STAGED -> IDLE (cancel)

pub mod actions;

pub use actions::{
    InvitationPayload, RefundPayload, SensitiveAction, SensitiveKind, TargetPayload, TransferPayload,
};

use crate::audit::{AuditLog, ExecutionRecord};
use crate::conversation::{ConversationStore, TakeOutcome};
use crate::dispatch::Dispatcher;
use crate::error::CommandError;
use crate::models::{CommandResult, Credential, ParsedCommand};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Body field carrying the passcode on replay.
pub const OTP_CODE_FLAG: &str = "otp_code";
pub const OTP_CODE_LENGTH: usize = 6;

const OTP_RESOURCE: &str = "otp";
const OTP_SEND_ACTION: &str = "send";

/// Exactly six ASCII digits. Leading zeros are significant.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == OTP_CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// A staged sensitive action awaiting its passcode.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PendingAction {
    pub action_id: Uuid,
    #[serde(flatten)]
    pub action: SensitiveAction,
    pub created_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn new(action: SensitiveAction) -> Self {
        Self {
            action_id: Uuid::new_v4(),
            action,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> SensitiveKind {
        self.action.kind()
    }
}

/// Returned by `propose`; nothing has touched the remote system yet.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Challenge {
    pub conversation_id: Uuid,
    pub action_id: Uuid,
    pub kind: SensitiveKind,
    pub summary: String,
    pub action: SensitiveAction,
    /// Action that was staged before and has now been discarded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced: Option<Uuid>,
    pub instructions: String,
}

impl Challenge {
    fn new(conversation_id: Uuid, pending: &PendingAction, replaced: Option<Uuid>) -> Self {
        Self {
            conversation_id,
            action_id: pending.action_id,
            kind: pending.kind(),
            summary: pending.action.summary(),
            action: pending.action.clone(),
            replaced,
            instructions: format!(
                "This action requires a {}-digit passcode. Request one with verify, then confirm with the code.",
                OTP_CODE_LENGTH
            ),
        }
    }
}

pub struct MfaGate {
    store: Arc<dyn ConversationStore>,
    dispatcher: Arc<Dispatcher>,
    audit_log: Arc<AuditLog>,
}

impl MfaGate {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        dispatcher: Arc<Dispatcher>,
        audit_log: Arc<AuditLog>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            audit_log,
        }
    }

    /// Stage `action`, overwriting whatever was staged before.
    pub async fn propose(&self, conversation_id: Uuid, action: SensitiveAction) -> Result<Challenge> {
        let pending = PendingAction::new(action);
        let replaced = self
            .store
            .set_pending(conversation_id, Some(pending.clone()))
            .await?
            .map(|previous| previous.action_id);

        info!(
            conversation_id = %conversation_id,
            action_id = %pending.action_id,
            kind = pending.kind().as_str(),
            replaced = ?replaced,
            "Staged sensitive action"
        );

        Ok(Challenge::new(conversation_id, &pending, replaced))
    }

    pub async fn pending(&self, conversation_id: Uuid) -> Option<PendingAction> {
        match self.store.get_pending(conversation_id).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Pending lookup failed");
                None
            }
        }
    }

    /// Trigger passcode delivery for the staged action. Safe to repeat.
    pub async fn request_verification(&self, conversation_id: Uuid, credential: &Credential) -> CommandResult {
        let Some(pending) = self.pending(conversation_id).await else {
            return CommandResult::failure(CommandError::NoPendingAction(conversation_id));
        };

        let command = ParsedCommand::new(OTP_RESOURCE, OTP_SEND_ACTION)
            .with_flag("action", json!(pending.kind().as_str()));

        info!(
            conversation_id = %conversation_id,
            action_id = %pending.action_id,
            "Requesting passcode delivery"
        );

        let mut result = self.dispatcher.dispatch_internal(&command, credential).await;
        if result.success {
            let delivery = result.data.take().unwrap_or(Value::Null);
            result.data = Some(json!({
                "action_id": pending.action_id,
                "kind": pending.kind(),
                "delivery": delivery,
            }));
        }
        result
    }

    /// Replay the staged action with `code`. `expected_action_id`, when given,
    /// must match the staged action or nothing runs.
    pub async fn confirm(
        &self,
        conversation_id: Uuid,
        code: &str,
        expected_action_id: Option<Uuid>,
        credential: &Credential,
    ) -> CommandResult {
        match self
            .try_confirm(conversation_id, code, expected_action_id, credential)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    conversation_id = %conversation_id,
                    kind = err.kind().as_str(),
                    "Confirmation rejected"
                );
                CommandResult::failure(err)
            }
        }
    }

    async fn try_confirm(
        &self,
        conversation_id: Uuid,
        code: &str,
        expected_action_id: Option<Uuid>,
        credential: &Credential,
    ) -> std::result::Result<CommandResult, CommandError> {
        if self.pending(conversation_id).await.is_none() {
            return Err(CommandError::NoPendingAction(conversation_id));
        }

        // Stage stays in place so the caller can retry with a corrected code.
        if !is_valid_code(code) {
            return Err(CommandError::InvalidCodeFormat);
        }

        let pending = self.take(conversation_id, expected_action_id).await?;

        let command = pending
            .action
            .to_command()
            .with_flag(OTP_CODE_FLAG, Value::String(code.to_string()));
        let result = self.dispatcher.dispatch(&command, credential).await;

        info!(
            conversation_id = %conversation_id,
            action_id = %pending.action_id,
            kind = pending.kind().as_str(),
            success = result.success,
            status = ?result.status,
            "Executed confirmed action"
        );

        let record = ExecutionRecord::new(conversation_id, &pending, &result);
        let audit_id = self.audit_log.record(record).await;
        debug!(action_id = %pending.action_id, audit_id = %audit_id, "Recorded execution");

        Ok(result)
    }

    /// Discard the staged action without running it.
    pub async fn cancel(&self, conversation_id: Uuid) -> CommandResult {
        match self.take(conversation_id, None).await {
            Ok(pending) => {
                info!(
                    conversation_id = %conversation_id,
                    action_id = %pending.action_id,
                    "Cancelled staged action"
                );
                CommandResult::ok(
                    None,
                    json!({
                        "cancelled": true,
                        "action_id": pending.action_id,
                        "kind": pending.kind(),
                    }),
                )
            }
            Err(err) => CommandResult::failure(err),
        }
    }

    async fn take(
        &self,
        conversation_id: Uuid,
        expected_action_id: Option<Uuid>,
    ) -> std::result::Result<PendingAction, CommandError> {
        let outcome = self
            .store
            .take_pending(conversation_id, expected_action_id)
            .await
            .map_err(|e| {
                warn!(conversation_id = %conversation_id, error = %e, "Pending take failed");
                CommandError::NoPendingAction(conversation_id)
            })?;

        match outcome {
            TakeOutcome::Taken(pending) => Ok(pending),
            TakeOutcome::Empty => Err(CommandError::NoPendingAction(conversation_id)),
            TakeOutcome::Superseded { current } => Err(CommandError::ActionSuperseded {
                expected: expected_action_id.unwrap_or(current),
                current,
            }),
        }
    }
}
