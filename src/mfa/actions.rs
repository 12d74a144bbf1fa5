//! Sensitive operations
//!
//! Each sensitive route maps to one variant with its own payload. Adding a
//! sensitive operation means adding a variant; `from_command`/`to_command`
//! stop compiling until it is handled.

use crate::error::CommandError;
use crate::models::ParsedCommand;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveKind {
    CreateTransfer,
    DeleteWebhookEndpoint,
    CreateRefund,
    DeleteLink,
    InviteTeamMember,
    DisableTeamMember,
}

impl SensitiveKind {
    pub const ALL: [SensitiveKind; 6] = [
        SensitiveKind::CreateTransfer,
        SensitiveKind::DeleteWebhookEndpoint,
        SensitiveKind::CreateRefund,
        SensitiveKind::DeleteLink,
        SensitiveKind::InviteTeamMember,
        SensitiveKind::DisableTeamMember,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensitiveKind::CreateTransfer => "create_transfer",
            SensitiveKind::DeleteWebhookEndpoint => "delete_webhook_endpoint",
            SensitiveKind::CreateRefund => "create_refund",
            SensitiveKind::DeleteLink => "delete_link",
            SensitiveKind::InviteTeamMember => "invite_team_member",
            SensitiveKind::DisableTeamMember => "disable_team_member",
        }
    }

    /// The `(resource, action)` this kind executes through.
    pub fn route(&self) -> (&'static str, &'static str) {
        match self {
            SensitiveKind::CreateTransfer => ("transfers", "create"),
            SensitiveKind::DeleteWebhookEndpoint => ("webhook_endpoints", "delete"),
            SensitiveKind::CreateRefund => ("refunds", "create"),
            SensitiveKind::DeleteLink => ("links", "delete"),
            SensitiveKind::InviteTeamMember => ("team_members", "invite"),
            SensitiveKind::DisableTeamMember => ("team_members", "disable"),
        }
    }
}

impl fmt::Display for SensitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Payloads =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransferPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub counterparty: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// Remaining flags, replayed untouched
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RefundPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InvitationPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// Payload of operations that target one existing object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TargetPayload {
    pub id: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl TargetPayload {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            options: Map::new(),
        }
    }
}

//
// ================= Action =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum SensitiveAction {
    CreateTransfer(TransferPayload),
    DeleteWebhookEndpoint(TargetPayload),
    CreateRefund(RefundPayload),
    DeleteLink(TargetPayload),
    InviteTeamMember(InvitationPayload),
    DisableTeamMember(TargetPayload),
}

impl SensitiveAction {
    pub fn kind(&self) -> SensitiveKind {
        match self {
            SensitiveAction::CreateTransfer(_) => SensitiveKind::CreateTransfer,
            SensitiveAction::DeleteWebhookEndpoint(_) => SensitiveKind::DeleteWebhookEndpoint,
            SensitiveAction::CreateRefund(_) => SensitiveKind::CreateRefund,
            SensitiveAction::DeleteLink(_) => SensitiveKind::DeleteLink,
            SensitiveAction::InviteTeamMember(_) => SensitiveKind::InviteTeamMember,
            SensitiveAction::DisableTeamMember(_) => SensitiveKind::DisableTeamMember,
        }
    }

    /// Normalize a parsed command into the staged form of `kind`.
    pub fn from_command(kind: SensitiveKind, command: &ParsedCommand) -> Result<Self, CommandError> {
        let mut flags = command.flags.clone();

        let action = match kind {
            SensitiveKind::CreateTransfer => SensitiveAction::CreateTransfer(TransferPayload {
                account_id: take_string(&mut flags, "account_id"),
                amount: flags.remove("amount"),
                currency: take_string(&mut flags, "currency").map(|c| c.to_uppercase()),
                counterparty: take_map(&mut flags, "counterparty"),
                comment: take_string(&mut flags, "comment"),
                reference_id: take_string(&mut flags, "reference_id"),
                options: flags,
            }),
            SensitiveKind::CreateRefund => SensitiveAction::CreateRefund(RefundPayload {
                resource_type: take_string(&mut flags, "resource_type"),
                resource_id: take_string(&mut flags, "resource_id")
                    .or_else(|| command.id.clone()),
                amount: flags.remove("amount"),
                options: flags,
            }),
            SensitiveKind::InviteTeamMember => SensitiveAction::InviteTeamMember(InvitationPayload {
                email: take_string(&mut flags, "email").map(|e| e.to_lowercase()),
                role: take_string(&mut flags, "role"),
                options: flags,
            }),
            SensitiveKind::DeleteWebhookEndpoint => {
                SensitiveAction::DeleteWebhookEndpoint(target(kind, command, flags)?)
            }
            SensitiveKind::DeleteLink => SensitiveAction::DeleteLink(target(kind, command, flags)?),
            SensitiveKind::DisableTeamMember => {
                SensitiveAction::DisableTeamMember(target(kind, command, flags)?)
            }
        };

        Ok(action)
    }

    /// The command that executes this action.
    pub fn to_command(&self) -> ParsedCommand {
        let (resource, action) = self.kind().route();
        let mut command = ParsedCommand::new(resource, action);

        match self {
            SensitiveAction::CreateTransfer(p) => {
                put_string(&mut command.flags, "account_id", &p.account_id);
                put_value(&mut command.flags, "amount", &p.amount);
                put_string(&mut command.flags, "currency", &p.currency);
                if !p.counterparty.is_empty() {
                    command
                        .flags
                        .insert("counterparty".to_string(), Value::Object(p.counterparty.clone()));
                }
                put_string(&mut command.flags, "comment", &p.comment);
                put_string(&mut command.flags, "reference_id", &p.reference_id);
                merge(&mut command.flags, &p.options);
            }
            SensitiveAction::CreateRefund(p) => {
                put_string(&mut command.flags, "resource_type", &p.resource_type);
                put_string(&mut command.flags, "resource_id", &p.resource_id);
                put_value(&mut command.flags, "amount", &p.amount);
                merge(&mut command.flags, &p.options);
            }
            SensitiveAction::InviteTeamMember(p) => {
                put_string(&mut command.flags, "email", &p.email);
                put_string(&mut command.flags, "role", &p.role);
                merge(&mut command.flags, &p.options);
            }
            SensitiveAction::DeleteWebhookEndpoint(p)
            | SensitiveAction::DeleteLink(p)
            | SensitiveAction::DisableTeamMember(p) => {
                command = command.with_id(p.id.as_str());
                merge(&mut command.flags, &p.options);
            }
        }

        command
    }

    /// Human-readable description shown in the challenge.
    pub fn summary(&self) -> String {
        match self {
            SensitiveAction::CreateTransfer(p) => {
                let amount = p
                    .amount
                    .as_ref()
                    .map(display_value)
                    .unwrap_or_else(|| "an unspecified amount".to_string());
                let currency = p.currency.as_deref().unwrap_or("");
                let destination = p
                    .counterparty
                    .get("account_number")
                    .or_else(|| p.counterparty.get("holder_name"))
                    .map(display_value)
                    .unwrap_or_else(|| "the counterparty".to_string());
                format!("Transfer {} {} to {}", amount, currency, destination)
                    .replace("  ", " ")
            }
            SensitiveAction::CreateRefund(p) => match (&p.amount, &p.resource_id) {
                (Some(amount), Some(id)) => format!("Refund {} of {}", display_value(amount), id),
                (None, Some(id)) => format!("Refund {} in full", id),
                _ => "Create a refund".to_string(),
            },
            SensitiveAction::InviteTeamMember(p) => format!(
                "Invite {} as {}",
                p.email.as_deref().unwrap_or("a new member"),
                p.role.as_deref().unwrap_or("a team member")
            ),
            SensitiveAction::DeleteWebhookEndpoint(p) => format!("Delete webhook endpoint {}", p.id),
            SensitiveAction::DeleteLink(p) => format!("Delete bank link {}", p.id),
            SensitiveAction::DisableTeamMember(p) => format!("Disable team member {}", p.id),
        }
    }
}

fn target(
    kind: SensitiveKind,
    command: &ParsedCommand,
    mut flags: Map<String, Value>,
) -> Result<TargetPayload, CommandError> {
    let flag_id = take_string(&mut flags, "id");
    let id = command
        .id
        .clone()
        .or(flag_id)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            let (resource, action) = kind.route();
            CommandError::MissingPositionalArgument {
                command: format!("{} {}", resource, action),
                placeholder: "id".to_string(),
            }
        })?;

    Ok(TargetPayload { id, options: flags })
}

/// Strings and numbers become text: identifiers coerced to numbers by the
/// parser are restored. A bare switch (`--account_id` with no value) is not
/// a value and stays in the flags as given.
fn take_string(flags: &mut Map<String, Value>, key: &str) -> Option<String> {
    match flags.remove(key)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        other => {
            flags.insert(key.to_string(), other);
            None
        }
    }
}

fn take_map(flags: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match flags.remove(key) {
        Some(Value::Object(map)) => map,
        Some(other) => {
            flags.insert(key.to_string(), other);
            Map::new()
        }
        None => Map::new(),
    }
}

fn put_string(flags: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        flags.insert(key.to_string(), Value::String(v.clone()));
    }
}

fn put_value(flags: &mut Map<String, Value>, key: &str, value: &Option<Value>) {
    if let Some(v) = value {
        flags.insert(key.to_string(), v.clone());
    }
}

fn merge(flags: &mut Map<String, Value>, options: &Map<String, Value>) {
    for (key, value) in options {
        flags.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::parser::parse;
    use serde_json::json;

    #[test]
    fn test_transfer_is_normalized() {
        let command = parse(
            "transfers create --amount 5000 --currency clp --account_id 12345 \
             --counterparty.account_number 987-654 --counterparty.holder_id 12.345.678-9 --mode live",
        );
        let action = SensitiveAction::from_command(SensitiveKind::CreateTransfer, &command).unwrap();

        let SensitiveAction::CreateTransfer(payload) = &action else {
            panic!("wrong variant: {:?}", action);
        };
        assert_eq!(payload.account_id.as_deref(), Some("12345"));
        assert_eq!(payload.amount, Some(json!(5000)));
        assert_eq!(payload.currency.as_deref(), Some("CLP"));
        assert_eq!(payload.counterparty.get("holder_id"), Some(&json!("12.345.678-9")));
        assert_eq!(payload.options.get("mode"), Some(&json!("live")));
        assert_eq!(action.summary(), "Transfer 5000 CLP to 987-654");
    }

    #[test]
    fn test_bare_switch_is_not_taken_as_a_value() {
        let command = parse("transfers create --account_id --amount 5");
        let action = SensitiveAction::from_command(SensitiveKind::CreateTransfer, &command).unwrap();

        let SensitiveAction::CreateTransfer(payload) = &action else {
            panic!("wrong variant: {:?}", action);
        };
        assert_eq!(payload.account_id, None);
        assert_eq!(payload.options.get("account_id"), Some(&json!(true)));
        assert_eq!(action.to_command().flags.get("account_id"), Some(&json!(true)));

        let err = SensitiveAction::from_command(
            SensitiveKind::DeleteLink,
            &parse("links delete --id"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingPositionalArgument);
    }

    #[test]
    fn test_serialized_shape_carries_kind_and_payload() {
        let action = SensitiveAction::DeleteLink(TargetPayload::new("link_1"));
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value, json!({"kind": "delete_link", "payload": {"id": "link_1"}}));

        let back: SensitiveAction = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_target_id_from_positional_or_flag() {
        let from_positional = SensitiveAction::from_command(
            SensitiveKind::DeleteWebhookEndpoint,
            &parse("webhook_endpoints delete we_1"),
        )
        .unwrap();
        let from_flag = SensitiveAction::from_command(
            SensitiveKind::DeleteWebhookEndpoint,
            &parse("webhook_endpoints delete --id we_1"),
        )
        .unwrap();
        assert_eq!(from_positional, from_flag);
    }

    #[test]
    fn test_target_without_id_is_rejected() {
        let err = SensitiveAction::from_command(
            SensitiveKind::DisableTeamMember,
            &parse("team_members disable --reason offboarding"),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingPositionalArgument);
    }

    #[test]
    fn test_to_command_replays_every_field() {
        let command = parse(
            "transfers create --amount 5000 --currency CLP --account_id acc_1 \
             --counterparty.account_number 987 --comment rent --metadata.invoice inv_9",
        );
        let action = SensitiveAction::from_command(SensitiveKind::CreateTransfer, &command).unwrap();
        let replay = action.to_command();

        assert_eq!(replay.resource, "transfers");
        assert_eq!(replay.action, "create");
        assert_eq!(replay.flags.get("amount"), Some(&json!(5000)));
        assert_eq!(replay.flags.get("counterparty"), Some(&json!({"account_number": 987})));
        assert_eq!(replay.flags.get("metadata"), Some(&json!({"invoice": "inv_9"})));
        assert_eq!(replay.flags.get("comment"), Some(&json!("rent")));
    }

    #[test]
    fn test_target_to_command_sets_id() {
        let action = SensitiveAction::DisableTeamMember(TargetPayload::new("tm_4"));
        let command = action.to_command();
        assert_eq!(command.route_key(), "team_members.disable");
        assert_eq!(command.id.as_deref(), Some("tm_4"));
    }

    #[test]
    fn test_refund_takes_positional_as_resource() {
        let action = SensitiveAction::from_command(
            SensitiveKind::CreateRefund,
            &parse("refunds create pi_77 --amount 1500"),
        )
        .unwrap();
        assert_eq!(action.summary(), "Refund 1500 of pi_77");
    }

    #[test]
    fn test_invitation_summary() {
        let action = SensitiveAction::from_command(
            SensitiveKind::InviteTeamMember,
            &parse("team_members invite --email Ana@Example.com --role admin"),
        )
        .unwrap();
        assert_eq!(action.summary(), "Invite ana@example.com as admin");
    }

    #[test]
    fn test_kind_routes_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for kind in SensitiveKind::ALL {
            assert!(seen.insert(kind.route()));
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
    }
}
