//! HTTP chat API for the web widget.
//!
//! Each email address is one direct conversation scope. Requests go straight
//! to the assistant, which already serializes work per scope.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::agent::assistant::{AssistRequest, Assistant};
use crate::channels::markup::to_html;
use crate::memory::MAX_HISTORY;
use crate::scope::ConversationScope;

/// Shared state for the API routes.
#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
}

/// Build the API router.
pub fn api_routes(assistant: Arc<Assistant>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat/send", post(send_message))
        .route("/api/chat/history", get(history))
        .route("/api/chat/reset", post(reset))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(ApiState { assistant })
}

/// Web users are keyed by normalized email.
fn web_scope(email: &str) -> ConversationScope {
    ConversationScope::direct(format!("web:{email}"))
}

fn normalize_email(raw: Option<&str>) -> Option<String> {
    raw.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty())
}

/// Non-blank string field from a JSON body.
fn text_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": message})),
    )
        .into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Chat API is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

// ── Send ────────────────────────────────────────────────────────────────

async fn send_message(State(state): State<ApiState>, Json(body): Json<Value>) -> Response {
    let Some(email) = normalize_email(text_field(&body, "email")) else {
        return bad_request("Email is required");
    };
    let Some(message) = text_field(&body, "message").map(str::trim) else {
        return bad_request("Message is required and must be a non-empty string");
    };
    let name = text_field(&body, "name").map(|n| n.trim().to_string());

    info!(email = %email, chars = message.len(), "API chat message");

    let request = AssistRequest::new(
        web_scope(&email),
        message,
        name.unwrap_or_else(|| email.clone()),
    );
    let reply = state.assistant.handle(&request).await;

    let mut data = json!({
        "user_message": message,
        "bot_response": reply.text,
        "bot_response_html": to_html(&reply.text),
        "timestamp": Utc::now().to_rfc3339(),
    });
    if let Some(search) = reply.search {
        data["api_response"] = serde_json::to_value(search).unwrap_or(Value::Null);
    }

    Json(json!({"success": true, "data": data})).into_response()
}

// ── History ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    email: Option<String>,
    limit: Option<String>,
}

async fn history(State(state): State<ApiState>, Query(query): Query<HistoryQuery>) -> Response {
    let Some(email) = normalize_email(query.email.as_deref()) else {
        return bad_request("Email is required as query parameter");
    };
    let limit = query
        .limit
        .as_deref()
        .and_then(|l| l.trim().parse::<usize>().ok())
        .unwrap_or(MAX_HISTORY);

    let turns = match state
        .assistant
        .memory()
        .full_history(&web_scope(&email), Some(limit))
        .await
    {
        Ok(turns) => turns,
        Err(e) => {
            error!(email = %email, error = %e, "Failed to load chat history");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "Internal server error",
                    "message": e.to_string(),
                })),
            )
                .into_response();
        }
    };

    let history: Vec<Value> = turns
        .iter()
        .map(|turn| {
            json!({
                "role": turn.role.as_str(),
                "message": turn.content,
                "message_html": to_html(&turn.content),
                "created_at": turn.occurred_at.to_rfc3339(),
            })
        })
        .collect();

    Json(json!({
        "success": true,
        "data": {
            "email": email,
            "total": history.len(),
            "history": history,
        }
    }))
    .into_response()
}

// ── Reset ───────────────────────────────────────────────────────────────

async fn reset(State(state): State<ApiState>, Json(body): Json<Value>) -> Response {
    let Some(email) = normalize_email(text_field(&body, "email")) else {
        return bad_request("Email is required");
    };

    state.assistant.reset(&web_scope(&email)).await;

    Json(json!({
        "success": true,
        "message": format!("Conversation state cleared for {email}"),
    }))
    .into_response()
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"success": false, "error": "Endpoint not found"})),
    )
}
