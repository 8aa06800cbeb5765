//! Chat API.
//!
//! Endpoints:
//!
//! - `POST   /api/chat`: Run one round, get the committed answer
//! - `GET    /api/history`: Persisted transcript of a session
//! - `POST   /api/reset`: Clear a session's transcript
//! - `GET    /api/tools`: Tools as the reasoning service sees them
//! - `DELETE /api/sessions/{id}`: Close and drop a session

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use toolbridge_agent::{OrchestrationLoop, Session};
use toolbridge_core::error::Error;
use toolbridge_core::message::{Role, Turn};
use toolbridge_core::reasoning::ToolSpec;
use toolbridge_tools::ManifestLoader;

// ── State ─────────────────────────────────────────────────────────────────

/// Session used when a request names none.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Shared state for the chat API.
pub struct ApiState {
    pub orchestrator: Arc<OrchestrationLoop>,
    pub manifests: Arc<ManifestLoader>,
    pub sessions: RwLock<HashMap<String, Arc<Session>>>,
    pub max_sessions: usize,
}

pub type SharedApiState = Arc<ApiState>;

impl ApiState {
    pub fn new(
        orchestrator: Arc<OrchestrationLoop>,
        manifests: Arc<ManifestLoader>,
        max_sessions: usize,
    ) -> Self {
        Self {
            orchestrator,
            manifests,
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Fetch a session, creating it on first use.
    ///
    /// At capacity, the oldest idle session is closed and dropped first. A
    /// session counts as idle only when no round is running on it and no
    /// request holds it, so a handed-out session is never evicted under the
    /// request that fetched it.
    pub async fn session(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            return session.clone();
        }

        if sessions.len() >= self.max_sessions {
            let oldest_idle = sessions
                .iter()
                .filter(|(_, s)| Arc::strong_count(s) == 1 && !s.is_busy())
                .min_by_key(|(_, s)| s.created_at())
                .map(|(k, _)| k.clone());
            match oldest_idle.and_then(|k| sessions.remove(&k)) {
                Some(evicted) => {
                    info!(session_id = %evicted.id(), "Evicting idle session");
                    evicted.close();
                }
                None => warn!(
                    sessions = sessions.len(),
                    "Session limit reached and every session is busy"
                ),
            }
        }

        let session = Arc::new(Session::new(id));
        sessions.insert(id.to_string(), session.clone());
        session
    }

    /// Look up a session without creating it.
    pub async fn existing_session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }
}

// ── Router ────────────────────────────────────────────────────────────────

/// Build the chat API router. Paths are absolute (`/api/...`).
pub fn api_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/history", get(history_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/tools", get(tools_handler))
        .route("/api/sessions/{id}", delete(close_session_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub content: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatErrorResponse {
    pub response: String,
    pub error: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

impl SessionQuery {
    fn id(&self) -> &str {
        self.session_id.as_deref().unwrap_or(DEFAULT_SESSION_ID)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageDto {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl From<&Turn> for MessageDto {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role(),
            content: turn.text(),
            timestamp: turn.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<MessageDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolSpec>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// HTTP status for a failed round or session operation.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::SessionBusy(_) => StatusCode::CONFLICT,
        Error::SessionClosed(_) | Error::Cancelled => StatusCode::GONE,
        Error::Reasoning(_) => StatusCode::BAD_GATEWAY,
        Error::Discovery(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::RoundTimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ChatErrorResponse>)> {
    let session_id = payload
        .session_id
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
    info!(session_id = %session_id, content_len = payload.content.len(), "Chat request");

    let fail = |error: Error| {
        (
            status_for(&error),
            Json(ChatErrorResponse {
                response: String::new(),
                error: error.to_string(),
                session_id: session_id.clone(),
            }),
        )
    };

    let manifest = state
        .manifests
        .load()
        .await
        .map_err(|e| fail(Error::Discovery(e)))?;
    let session = state.session(&session_id).await;

    let outcome = state
        .orchestrator
        .run_round(&session, &manifest, &payload.content)
        .await
        .map_err(fail)?;

    Ok(Json(ChatResponse {
        response: outcome.answer,
        session_id,
    }))
}

async fn history_handler(
    State(state): State<SharedApiState>,
    Query(query): Query<SessionQuery>,
) -> Json<HistoryResponse> {
    let messages = match state.existing_session(query.id()).await {
        Some(session) => session.history().iter().map(MessageDto::from).collect(),
        None => Vec::new(),
    };
    Json(HistoryResponse { messages })
}

async fn reset_handler(
    State(state): State<SharedApiState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    if let Some(session) = state.existing_session(query.id()).await {
        session.reset().map_err(|e| {
            (
                status_for(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
        })?;
    }
    Ok(Json(StatusResponse {
        status: "reset".into(),
    }))
}

async fn tools_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<ToolListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let manifest = state.manifests.load().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    let tools = manifest.to_reasoning_format();
    Ok(Json(ToolListResponse {
        count: tools.len(),
        tools,
    }))
}

async fn close_session_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> StatusCode {
    match state.sessions.write().await.remove(&id) {
        Some(session) => {
            session.close();
            info!(session_id = %id, "Session closed");
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
