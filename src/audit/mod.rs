//! Audit ledger for confirmed sensitive actions
//!
//! One record per replay, successful or not. The payload hash lets a record
//! be checked against the action it claims to have run.

use crate::error::ErrorKind;
use crate::mfa::{PendingAction, SensitiveAction, SensitiveKind};
use crate::models::CommandResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionRecord {
    pub audit_id: Uuid,
    pub conversation_id: Uuid,
    pub action_id: Uuid,
    pub kind: SensitiveKind,
    pub action: SensitiveAction,
    pub payload_hash: String,
    pub success: bool,
    pub status: Option<u16>,
    pub error_kind: Option<ErrorKind>,
    pub proposed_at: DateTime<Utc>,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn new(conversation_id: Uuid, pending: &PendingAction, result: &CommandResult) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            conversation_id,
            action_id: pending.action_id,
            kind: pending.kind(),
            action: pending.action.clone(),
            payload_hash: compute_payload_hash(&pending.action),
            success: result.success,
            status: result.status,
            error_kind: result.error_kind(),
            proposed_at: pending.created_at,
            executed_at: Utc::now(),
        }
    }
}

/// Audit trail storage
pub struct AuditLog {
    records: Arc<RwLock<HashMap<Uuid, ExecutionRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn record(&self, record: ExecutionRecord) -> Uuid {
        let audit_id = record.audit_id;
        let mut records = self.records.write().await;
        records.insert(audit_id, record);
        audit_id
    }

    pub async fn get(&self, audit_id: Uuid) -> Option<ExecutionRecord> {
        let records = self.records.read().await;
        records.get(&audit_id).cloned()
    }

    /// Records for one conversation, oldest first
    pub async fn list_for_conversation(&self, conversation_id: Uuid) -> Vec<ExecutionRecord> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .values()
            .filter(|record| record.conversation_id == conversation_id)
            .cloned()
            .collect();

        items.sort_by_key(|record| record.executed_at);
        items
    }

    /// Recompute the payload hash of a stored record
    pub async fn verify_integrity(&self, audit_id: Uuid) -> bool {
        let records = self.records.read().await;

        records
            .get(&audit_id)
            .map(|record| compute_payload_hash(&record.action) == record.payload_hash)
            .unwrap_or(false)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 over the action's JSON form, streamed straight into the hasher.
pub fn compute_payload_hash(action: &SensitiveAction) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), action).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
