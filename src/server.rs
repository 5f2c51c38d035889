//! HTTP chat server.
//!
//! A thin JSON layer over [`RagService::answer`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer `{ "message": string }` |
//! | `POST` | `/feedback` | Record a thumbs-up/down style rating in the log |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Response contract
//!
//! ```json
//! { "response": "...", "status": "success" }
//! { "error": "No message provided", "status": "error" }
//! ```
//!
//! `/chat` never reports a pipeline failure as an HTTP error: the service
//! answers with its fallback text and the request still succeeds.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser chat
//! widget can be served from anywhere.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::service::RagService;

/// Characters of the rated message included in the feedback log line.
const FEEDBACK_EXCERPT_CHARS: usize = 100;

#[derive(Clone)]
struct AppState {
    service: Arc<RagService>,
}

/// Starts the chat server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config, service: Arc<RagService>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "chat server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// The route table, for embedding in another server or in tests.
pub fn router(service: Arc<RagService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/feedback", post(handle_feedback))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: &'static str,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            status: "error",
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    status: &'static str,
}

async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = body.map_err(|e| {
        warn!(error = %e, "rejected chat request");
        bad_request("Invalid JSON body")
    })?;

    let message = request
        .message
        .filter(|m| !m.is_empty())
        .ok_or_else(|| bad_request("No message provided"))?;

    let response = state.service.answer(&message).await;

    Ok(Json(ChatResponse {
        response,
        status: "success",
    }))
}

// ============ POST /feedback ============

#[derive(Deserialize)]
struct FeedbackRequest {
    #[serde(default)]
    feedback: serde_json::Value,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct FeedbackResponse {
    status: &'static str,
    message: &'static str,
}

async fn handle_feedback(
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, AppError> {
    let Json(request) = body.map_err(|e| {
        warn!(error = %e, "rejected feedback request");
        bad_request("Invalid JSON body")
    })?;

    let excerpt: String = request.message.chars().take(FEEDBACK_EXCERPT_CHARS).collect();
    info!(feedback = %request.feedback, message = %excerpt, "feedback received");

    Ok(Json(FeedbackResponse {
        status: "success",
        message: "Feedback received successfully",
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
