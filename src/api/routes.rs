//! REST endpoints for conversation routing and direct invocation.

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use uuid::Uuid;

use super::AppState;
use crate::error::GatewayError;
use crate::router::RoutingOutcome;
use crate::session::{Message, RoutingState};

/// Build the Axum router with all gateway routes.
pub fn gateway_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/capabilities", get(list_capabilities))
        .route("/api/conversation", post(converse))
        .route("/api/conversation/{id}", get(get_conversation))
        .route("/api/invoke", post(invoke))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP status for a gateway failure.
pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::ConfigNotFound { .. } => StatusCode::NOT_FOUND,
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Spawn { .. } | GatewayError::Process { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::Cancelled { .. } | GatewayError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// ── Capabilities ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct RuleView<'a> {
    domain: &'a str,
    worker: &'a str,
    keywords: &'a [String],
}

async fn list_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    let classifier = state.router.classifier();
    let rules: Vec<RuleView<'_>> = classifier
        .rules()
        .iter()
        .map(|rule| RuleView {
            domain: &rule.domain,
            worker: &rule.worker,
            keywords: &rule.keywords,
        })
        .collect();

    Json(serde_json::json!({
        "success": true,
        "servers": state.directory.list(),
        "capabilities": state.directory.describe(),
        "routing": {
            "rules": rules,
            "defaultWorker": classifier.default_worker(),
        },
    }))
}

// ── Conversation ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationRequest {
    conversation_id: Option<String>,
    message: Option<String>,
    #[serde(default)]
    context: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ConversationResponse {
    #[serde(rename_all = "camelCase")]
    Success {
        success: bool,
        message: String,
        result: String,
        conversation_id: String,
        mcp_used: String,
    },
    #[serde(rename_all = "camelCase")]
    Failure {
        success: bool,
        message: String,
        error: String,
        conversation_id: String,
    },
}

fn failure(
    error: &GatewayError,
    message: &str,
    conversation_id: String,
) -> (StatusCode, Json<ConversationResponse>) {
    (
        status_for(error),
        Json(ConversationResponse::Failure {
            success: false,
            message: message.to_string(),
            error: error.public_message(),
            conversation_id,
        }),
    )
}

async fn converse(
    State(state): State<AppState>,
    body: Result<Json<ConversationRequest>, JsonRejection>,
) -> (StatusCode, Json<ConversationResponse>) {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            let error = invalid_body(&rejection);
            return failure(&error, "Invalid request body", Uuid::new_v4().to_string());
        }
    };

    // Absent or blank ids get a fresh one; the client learns it from the response.
    let conversation_id = req
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let Some(message) = req.message.filter(|m| !m.trim().is_empty()) else {
        let error = GatewayError::Validation("message is required".to_string());
        debug!(conversation_id = %conversation_id, "Rejected conversation request without message");
        return failure(&error, "Message is required", conversation_id);
    };

    // A client disconnect drops this future, which kills the worker process.
    let outcome = state
        .router
        .route(&conversation_id, &message, req.context.unwrap_or_default())
        .await;

    match outcome {
        RoutingOutcome::Success {
            conversation_id,
            worker,
            output,
        } => (
            StatusCode::OK,
            Json(ConversationResponse::Success {
                success: true,
                message: "Conversation processed successfully".to_string(),
                result: output,
                conversation_id,
                mcp_used: worker,
            }),
        ),
        RoutingOutcome::Failure {
            conversation_id,
            error,
            ..
        } => failure(&error, "Error processing conversation", conversation_id),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationView {
    conversation_id: String,
    state: RoutingState,
    bound_worker: Option<String>,
    context: Map<String, Value>,
    messages: Vec<Message>,
    created_at: chrono::DateTime<chrono::Utc>,
    last_active: chrono::DateTime<chrono::Utc>,
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationView>, StatusCode> {
    let session = state
        .router
        .store()
        .snapshot(&id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ConversationView {
        conversation_id: session.id.clone(),
        state: session.state(),
        bound_worker: session.bound_worker().map(str::to_string),
        context: session.context().clone(),
        messages: session.messages().to_vec(),
        created_at: session.created_at,
        last_active: session.last_active,
    }))
}

// ── Direct invocation ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvokeRequest {
    worker_id: Option<String>,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct InvokeResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn invoke_failure(error: &GatewayError) -> (StatusCode, Json<InvokeResponse>) {
    (
        status_for(error),
        Json(InvokeResponse {
            success: false,
            output: None,
            error: Some(error.public_message()),
        }),
    )
}

async fn invoke(
    State(state): State<AppState>,
    body: Result<Json<InvokeRequest>, JsonRejection>,
) -> (StatusCode, Json<InvokeResponse>) {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return invoke_failure(&invalid_body(&rejection)),
    };

    let Some(worker_id) = req.worker_id.filter(|id| !id.trim().is_empty()) else {
        return invoke_failure(&GatewayError::Validation("workerId is required".to_string()));
    };

    info!(worker = %worker_id, "Direct invocation");
    match state
        .directory
        .invoke(&worker_id, req.payload.unwrap_or_default())
        .await
    {
        Ok(result) => (
            StatusCode::OK,
            Json(InvokeResponse {
                success: true,
                output: Some(result.output),
                error: None,
            }),
        ),
        Err(error) => invoke_failure(&error),
    }
}

/// Unreadable bodies (bad JSON, wrong content type, wrong field types) are validation failures.
fn invalid_body(rejection: &JsonRejection) -> GatewayError {
    debug!(status = %rejection.status(), reason = %rejection.body_text(), "Rejected request body");
    GatewayError::Validation(rejection.body_text())
}
