//! Command orchestrator - single entry point for callers
//!
//! TEXT → PARSE → LOOKUP → DISPATCH | STAGE → HISTORY
//!
//! Non-sensitive routes and help go straight to the dispatcher. Sensitive
//! routes are normalized into a `SensitiveAction` and staged through the
//! MFA gate; the caller gets a challenge back.

use crate::audit::AuditLog;
use crate::config::GatewayConfig;
use crate::conversation::{Conversation, ConversationMessage, ConversationStore, InMemoryConversationStore};
use crate::dispatch::Dispatcher;
use crate::mfa::{Challenge, MfaGate, SensitiveAction};
use crate::models::{CommandResult, Credential, ParsedCommand};
use crate::parser::parse;
use crate::routes::RouteRegistry;
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What happened to one caller command.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "result", rename_all = "snake_case")]
pub enum Outcome {
    Completed(CommandResult),
    Challenge(Challenge),
}

impl Outcome {
    pub fn summary(&self) -> String {
        match self {
            Outcome::Completed(result) => result.summary(),
            Outcome::Challenge(challenge) => {
                format!("passcode required: {}", challenge.summary)
            }
        }
    }

    pub fn is_challenge(&self) -> bool {
        matches!(self, Outcome::Challenge(_))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Reply {
    pub conversation_id: Uuid,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Main orchestrator that ties parser, dispatcher and MFA gate together
pub struct Orchestrator {
    store: Arc<dyn ConversationStore>,
    dispatcher: Arc<Dispatcher>,
    gate: MfaGate,
    audit_log: Arc<AuditLog>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        dispatcher: Arc<Dispatcher>,
        audit_log: Arc<AuditLog>,
    ) -> Self {
        let gate = MfaGate::new(store.clone(), dispatcher.clone(), audit_log.clone());
        Self {
            store,
            dispatcher,
            gate,
            audit_log,
        }
    }

    /// Wire the default components around `transport`.
    pub fn with_transport(transport: Arc<dyn Transport>, config: &GatewayConfig) -> Self {
        let dispatcher = Dispatcher::new(RouteRegistry::builtin(), transport)
            .with_current_organization(config.current_organization_id.clone());
        let store = InMemoryConversationStore::with_idle_ttl(config.conversation_idle_ttl);

        Self::new(Arc::new(store), Arc::new(dispatcher), Arc::new(AuditLog::new()))
    }

    /// Production wiring over HTTP.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn registry(&self) -> &RouteRegistry {
        self.dispatcher.registry()
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    pub fn gate(&self) -> &MfaGate {
        &self.gate
    }

    /// Run one line of caller text inside a conversation.
    pub async fn handle(
        &self,
        conversation_id: Option<Uuid>,
        text: &str,
        credential: &Credential,
    ) -> Result<Reply> {
        let command = parse(text);
        debug!(command = %command, "Parsed command");
        self.handle_command(conversation_id, text, &command, credential).await
    }

    /// Same as `handle` for an already tokenized command. `text` is what
    /// lands in the history.
    pub async fn handle_command(
        &self,
        conversation_id: Option<Uuid>,
        text: &str,
        command: &ParsedCommand,
        credential: &Credential,
    ) -> Result<Reply> {
        let start = Instant::now();
        let conversation = self.store.get_or_create(conversation_id).await;
        let conversation_id = conversation.id;

        self.store
            .append_message(conversation_id, ConversationMessage::user(text))
            .await?;

        let sensitive = self
            .dispatcher
            .registry()
            .lookup(&command.resource, &command.action)
            .and_then(|descriptor| descriptor.sensitive);

        let outcome = match sensitive {
            Some(kind) => match SensitiveAction::from_command(kind, command) {
                Ok(action) => Outcome::Challenge(self.gate.propose(conversation_id, action).await?),
                Err(err) => Outcome::Completed(CommandResult::failure(err)),
            },
            None => Outcome::Completed(self.dispatcher.dispatch(command, credential).await),
        };

        if let Outcome::Challenge(Challenge { replaced: Some(previous), .. }) = &outcome {
            self.store
                .append_message(
                    conversation_id,
                    ConversationMessage::system(format!("Staged action {} was replaced", previous)),
                )
                .await?;
        }

        let message_type = if outcome.is_challenge() { "challenge" } else { "result" };
        self.store
            .append_message(
                conversation_id,
                ConversationMessage::agent(outcome.summary(), message_type),
            )
            .await?;

        info!(
            conversation_id = %conversation_id,
            command = %command.route_key(),
            outcome = message_type,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Handled command"
        );

        Ok(Reply {
            conversation_id,
            outcome,
        })
    }

    pub async fn verify(&self, conversation_id: Uuid, credential: &Credential) -> CommandResult {
        let result = self.gate.request_verification(conversation_id, credential).await;
        self.note(conversation_id, "verify", &result).await;
        result
    }

    pub async fn confirm(
        &self,
        conversation_id: Uuid,
        code: &str,
        expected_action_id: Option<Uuid>,
        credential: &Credential,
    ) -> CommandResult {
        let result = self
            .gate
            .confirm(conversation_id, code, expected_action_id, credential)
            .await;
        // The passcode itself never enters the history.
        self.note(conversation_id, "confirm ******", &result).await;
        result
    }

    pub async fn cancel(&self, conversation_id: Uuid) -> CommandResult {
        let result = self.gate.cancel(conversation_id).await;
        self.note(conversation_id, "cancel", &result).await;
        result
    }

    pub async fn conversation(&self, conversation_id: Uuid) -> Option<Conversation> {
        self.store.get(conversation_id).await
    }

    /// History entries for gate calls. Unknown conversations are skipped.
    async fn note(&self, conversation_id: Uuid, request: &str, result: &CommandResult) {
        if self.store.get(conversation_id).await.is_none() {
            return;
        }

        let entries = [
            ConversationMessage::user(request),
            ConversationMessage::agent(result.summary(), "result"),
        ];
        for message in entries {
            if let Err(e) = self.store.append_message(conversation_id, message).await {
                warn!(conversation_id = %conversation_id, error = %e, "Failed to append history");
            }
        }
    }
}
