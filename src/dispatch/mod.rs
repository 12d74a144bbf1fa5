//! Dispatcher
//!
//! Resolves a parsed command against the route registry, shapes the request
//! (path substitution, query/body partition) and hands it to the transport.
//! Every failure is returned inside the `CommandResult`; nothing propagates
//! past `dispatch`.

use crate::error::CommandError;
use crate::models::{normalize, CommandResult, Credential, ParsedCommand};
use crate::routes::{Placement, ResponseFormat, RouteDescriptor, RouteRegistry, CURRENT_ORGANIZATION_FLAG};
use crate::transport::{Transport, TransportRequest};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Reserved resource/action answered locally from the catalog.
pub const HELP_TOKEN: &str = "help";

pub struct Dispatcher {
    registry: Arc<RouteRegistry>,
    transport: Arc<dyn Transport>,
    current_organization: Option<String>,
}

impl Dispatcher {
    pub fn new(registry: Arc<RouteRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
            current_organization: None,
        }
    }

    /// Organization sent with every call that does not carry its own.
    pub fn with_current_organization(mut self, organization_id: Option<String>) -> Self {
        self.current_organization = organization_id;
        self
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Execute one command and report the outcome.
    pub async fn dispatch(&self, command: &ParsedCommand, credential: &Credential) -> CommandResult {
        let outcome = self.try_dispatch(command, credential).await;
        report(command, outcome)
    }

    /// Execute a route from the internal table. Only the MFA gate reaches
    /// these; caller input never resolves to them.
    pub(crate) async fn dispatch_internal(&self, command: &ParsedCommand, credential: &Credential) -> CommandResult {
        let outcome = match self.registry.lookup_internal(&command.resource, &command.action) {
            Some(descriptor) => match self.build_request(descriptor, command, credential) {
                Ok(request) => self.send(&command.route_key(), request).await,
                Err(err) => Err(err),
            },
            None => Err(self.unknown(command)),
        };
        report(command, outcome)
    }

    async fn try_dispatch(
        &self,
        command: &ParsedCommand,
        credential: &Credential,
    ) -> std::result::Result<CommandResult, CommandError> {
        if let Some(help) = self.help(command) {
            return help;
        }

        let request = self.resolve(command, credential)?;
        self.send(&command.route_key(), request).await
    }

    async fn send(
        &self,
        route_key: &str,
        request: TransportRequest,
    ) -> std::result::Result<CommandResult, CommandError> {
        debug!(
            command = %route_key,
            method = %request.method,
            path = %request.path,
            query_flags = request.query.len(),
            body_flags = request.body.len(),
            "Dispatching command"
        );

        let start = Instant::now();
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| CommandError::TransportFailure(e.to_string()))?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            command = %route_key,
            status = response.status,
            elapsed_ms,
            "Command completed"
        );

        if response.is_success() {
            Ok(CommandResult::ok(Some(response.status), response.body))
        } else {
            Err(CommandError::RemoteExecutionFailure {
                status: response.status,
                body: response.body,
            })
        }
    }

    /// Compute the request a command would send, without sending it.
    pub fn resolve(
        &self,
        command: &ParsedCommand,
        credential: &Credential,
    ) -> std::result::Result<TransportRequest, CommandError> {
        let descriptor = self
            .registry
            .lookup(&command.resource, &command.action)
            .ok_or_else(|| self.unknown(command))?;

        self.build_request(descriptor, command, credential)
    }

    fn unknown(&self, command: &ParsedCommand) -> CommandError {
        CommandError::UnknownCommand {
            command: format!("{} {}", command.resource, command.action).trim().to_string(),
            catalog: self.registry.render_catalog(),
        }
    }

    fn build_request(
        &self,
        descriptor: &RouteDescriptor,
        command: &ParsedCommand,
        credential: &Credential,
    ) -> std::result::Result<TransportRequest, CommandError> {
        let path = match descriptor.placeholder() {
            Some(placeholder) => descriptor
                .render_path(command.id.as_deref().unwrap_or(""))
                .ok_or_else(|| CommandError::MissingPositionalArgument {
                    command: format!("{} {}", descriptor.resource, descriptor.action),
                    placeholder: placeholder.to_string(),
                })?,
            None => {
                if let Some(id) = &command.id {
                    debug!(id = %id, route = %descriptor.key(), "Ignoring positional argument");
                }
                descriptor.path.to_string()
            }
        };

        let mut query = Map::new();
        let mut body = Map::new();

        for (name, value) in &command.flags {
            if name == CURRENT_ORGANIZATION_FLAG {
                query.insert(name.clone(), value.clone());
                continue;
            }

            match descriptor.placement.resolve(descriptor.method, name) {
                Placement::Query => query.insert(name.clone(), value.clone()),
                Placement::Body => body.insert(name.clone(), value.clone()),
            };
        }

        if !query.contains_key(CURRENT_ORGANIZATION_FLAG) {
            if let Some(organization_id) = &self.current_organization {
                query.insert(
                    CURRENT_ORGANIZATION_FLAG.to_string(),
                    Value::String(organization_id.clone()),
                );
            }
        }

        Ok(TransportRequest {
            method: descriptor.method,
            path,
            query,
            body,
            credential: credential.clone(),
            binary_response: descriptor.response == ResponseFormat::Binary,
        })
    }

    /// `help`, `help <resource>`, `<resource> help` and a bare `<resource>`
    /// are answered from the catalog.
    ///
    /// A bare `<resource>` has an empty action, which can never name a
    /// route, so it is read as a request for that resource's help rather
    /// than reported as an unknown command.
    fn help(&self, command: &ParsedCommand) -> Option<std::result::Result<CommandResult, CommandError>> {
        let resource = normalize(&command.resource);
        let action = normalize(&command.action);

        if resource.is_empty() || resource == HELP_TOKEN {
            let target = (!action.is_empty()).then_some(action);
            return Some(self.render_help(target.as_deref()));
        }

        if action.is_empty() || action == HELP_TOKEN {
            return Some(self.render_help(Some(resource.as_str())));
        }

        None
    }

    fn render_help(&self, resource: Option<&str>) -> std::result::Result<CommandResult, CommandError> {
        let Some(resource) = resource else {
            return Ok(CommandResult::ok(
                None,
                json!({
                    "help": self.registry.render_catalog(),
                    "resources": self.registry.resources(),
                }),
            ));
        };

        if !self.registry.has_resource(resource) {
            return Err(CommandError::UnknownCommand {
                command: format!("{} {}", resource, HELP_TOKEN),
                catalog: self.registry.render_resource_list(),
            });
        }
        let text = self.registry.render_resource(resource).unwrap_or_default();

        let actions: Vec<&str> = self
            .registry
            .list()
            .iter()
            .filter(|r| r.resource == resource)
            .map(|r| r.action)
            .collect();

        Ok(CommandResult::ok(
            None,
            json!({
                "help": text,
                "resource": resource,
                "actions": actions,
            }),
        ))
    }
}

/// Fold a dispatch outcome into the caller-facing result.
fn report(
    command: &ParsedCommand,
    outcome: std::result::Result<CommandResult, CommandError>,
) -> CommandResult {
    match outcome {
        Ok(result) => result,
        Err(err) => {
            warn!(
                command = %command.route_key(),
                kind = err.kind().as_str(),
                error = %err,
                "Command failed"
            );
            CommandResult::failure(err)
        }
    }
}
