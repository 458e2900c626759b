//! HTTP query API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question from the loaded index |
//! | `GET`  | `/health` | Health check (returns version and entry count) |
//!
//! # `POST /ask`
//!
//! ```json
//! { "text": "What is the safe code in the pharmacy?", "sources": true }
//! ```
//!
//! `sources` is optional. Success is `200 {"answer": "...", "sources": [...]}`,
//! with `sources` present only when requested.
//!
//! # Error Contract
//!
//! | Condition | Status | Body |
//! |-----------|--------|------|
//! | body is not JSON, or `text` missing/blank | 400 | `{"error": "No text provided"}` |
//! | hosted-model credential missing/rejected | 500 | `{"error": "<message>"}` |
//! | any other failure | 500 | `{"error": "An error occurred: <message>"}` |
//!
//! A failed request never takes the server down; the engine and index are
//! shared read-only across requests.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends can
//! call the API directly.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::error::RagError;
use crate::models::Source;
use crate::qa::QaEngine;

const NO_TEXT: &str = "No text provided";

/// Build the application router around a ready engine.
pub fn router(engine: Arc<QaEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(engine)
}

/// Bind `bind_addr` and serve until the process is terminated.
pub async fn run_server(engine: Arc<QaEngine>, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    println!("Listening on http://{}", listener.local_addr()?);
    info!(bind = %bind_addr, entries = engine.index().len(), "server started");

    axum::serve(listener, router(engine)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Error type that converts into the JSON error contract.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::InvalidInput(_) => bad_request(NO_TEXT),
            RagError::UpstreamAuth(message) => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message,
            },
            other => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("An error occurred: {}", other),
            },
        }
    }
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    text: Option<String>,
    #[serde(default)]
    sources: bool,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<Vec<Source>>,
}

/// Handler for `POST /ask`.
///
/// The body is parsed by hand so malformed JSON gets the same 400 as a
/// missing `text` field.
async fn handle_ask(
    State(engine): State<Arc<QaEngine>>,
    body: Bytes,
) -> Result<Json<AskResponse>, AppError> {
    let request: AskRequest =
        serde_json::from_slice(&body).map_err(|_| bad_request(NO_TEXT))?;
    let question = match request.text.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => q.to_string(),
        _ => return Err(bad_request(NO_TEXT)),
    };

    match engine.answer(&question, request.sources).await {
        Ok(answer) => Ok(Json(AskResponse {
            answer: answer.text,
            sources: answer.sources,
        })),
        Err(e) => {
            error!(error = %e, "ask failed");
            Err(e.into())
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    entries: usize,
}

async fn handle_health(State(engine): State<Arc<QaEngine>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        entries: engine.index().len(),
    })
}
