//! REST API Server for the financial command gateway
//!
//! Exposes the orchestrator and the passcode flow over HTTP.

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::agent::{Orchestrator, Outcome};
use crate::error::ErrorKind;
use crate::models::{CommandResult, Credential};
use crate::parser::parse_args;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub conversation_id: Option<Uuid>,
    /// Raw command line
    pub command: Option<String>,
    /// Pre-split tokens, used when `command` is absent
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub conversation_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub conversation_id: Uuid,
    pub code: String,
    /// Action the caller believes is staged
    pub action_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct HelpQuery {
    pub resource: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Failed commands keep their structured detail in `data`.
    fn from_result<T: Serialize>(result: &CommandResult, data: T) -> Self {
        Self {
            success: result.success,
            data: serde_json::to_value(data).ok(),
            error: result.error.as_ref().map(|e| e.message.clone()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub default_credential: Credential,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>, default_credential: Credential) -> Self {
        Self {
            orchestrator,
            default_credential,
        }
    }

    /// `Authorization` header, falling back to the configured key.
    fn credential(&self, headers: &HeaderMap) -> Credential {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(Credential::new)
            .unwrap_or_else(|| self.default_credential.clone())
    }
}

fn status_for(result: &CommandResult) -> StatusCode {
    match result.error_kind() {
        None => StatusCode::OK,
        Some(ErrorKind::UnknownCommand) => StatusCode::NOT_FOUND,
        Some(ErrorKind::MissingPositionalArgument) | Some(ErrorKind::InvalidCodeFormat) => {
            StatusCode::BAD_REQUEST
        }
        Some(ErrorKind::NoPendingAction) | Some(ErrorKind::ActionSuperseded) => StatusCode::CONFLICT,
        Some(ErrorKind::RemoteExecutionFailure) | Some(ErrorKind::TransportFailure) => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn respond(result: CommandResult) -> (StatusCode, Json<ApiResponse>) {
    (status_for(&result), Json(ApiResponse::from_result(&result, &result)))
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Help Endpoint
/// =============================

async fn help(
    State(state): State<ApiState>,
    Query(query): Query<HelpQuery>,
) -> (StatusCode, Json<ApiResponse>) {
    let registry = state.orchestrator.registry();

    match query.resource.as_deref() {
        None => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "help": registry.render_catalog(),
                "resources": registry.resources(),
            }))),
        ),
        Some(resource) => match registry.render_resource(resource) {
            Some(text) => (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "help": text,
                    "resource": resource,
                }))),
            ),
            None => (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error(registry.render_resource_list())),
            ),
        },
    }
}

/// =============================
/// Conversation Endpoints
/// =============================

async fn create_conversation(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    let conversation = state.orchestrator.store().get_or_create(None).await;
    info!(conversation_id = %conversation.id, "Opened conversation");

    (
        StatusCode::CREATED,
        Json(ApiResponse::success(serde_json::json!({
            "conversation_id": conversation.id,
            "created_at": conversation.created_at,
        }))),
    )
}

async fn get_conversation(
    State(state): State<ApiState>,
    Path(conversation_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.conversation(conversation_id).await {
        Some(conversation) => (StatusCode::OK, Json(ApiResponse::success(conversation))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!(
                "Conversation not found: {}",
                conversation_id
            ))),
        ),
    }
}

/// =============================
/// Command Endpoint
/// =============================

async fn run_command(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<CommandRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let credential = state.credential(&headers);

    let reply = match req.command {
        Some(text) => {
            state
                .orchestrator
                .handle(req.conversation_id, &text, &credential)
                .await
        }
        None if !req.args.is_empty() => {
            let text = req.args.join(" ");
            let command = parse_args(req.args);
            state
                .orchestrator
                .handle_command(req.conversation_id, &text, &command, &credential)
                .await
        }
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("Either command or args is required".into())),
            )
        }
    };

    match reply {
        Ok(reply) => match &reply.outcome {
            Outcome::Challenge(_) => (StatusCode::ACCEPTED, Json(ApiResponse::success(&reply))),
            Outcome::Completed(result) => (
                status_for(result),
                Json(ApiResponse::from_result(result, &reply)),
            ),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Command failed: {}", e))),
        ),
    }
}

/// =============================
/// Passcode Endpoints
/// =============================

async fn verify_action(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<ActionRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let credential = state.credential(&headers);
    respond(state.orchestrator.verify(req.conversation_id, &credential).await)
}

async fn confirm_action(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<ConfirmRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let credential = state.credential(&headers);
    respond(
        state
            .orchestrator
            .confirm(req.conversation_id, &req.code, req.action_id, &credential)
            .await,
    )
}

async fn cancel_action(
    State(state): State<ApiState>,
    Json(req): Json<ActionRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    respond(state.orchestrator.cancel(req.conversation_id).await)
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/help", get(help))
        .route("/api/conversations", post(create_conversation))
        .route("/api/conversations/:id", get(get_conversation))
        .route("/api/command", post(run_command))
        .route("/api/actions/verify", post(verify_action))
        .route("/api/actions/confirm", post(confirm_action))
        .route("/api/actions/cancel", post(cancel_action))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
