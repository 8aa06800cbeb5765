//! Error types for the toolbridge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! is what a round reports to its caller.
//!
//! Tool failures are the exception: [`ToolInvocationError`] never crosses the
//! invoker boundary as an `Err`. It is rendered into an error payload with
//! [`ToolInvocationError::to_payload`] and fed back to the reasoning service.

use thiserror::Error;

/// The top-level error type for a round or a session operation.
#[derive(Debug, Error)]
pub enum Error {
    // --- Manifest errors ---
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    // --- Reasoning service errors ---
    #[error("Reasoning service error: {0}")]
    Reasoning(#[from] ReasoningError),

    // --- Round lifecycle ---
    #[error("tool loop exceeded: more than {max_tool_rounds} tool rounds requested")]
    LoopBoundExceeded { max_tool_rounds: u32 },

    #[error("Round timed out after {timeout_secs}s")]
    RoundTimedOut { timeout_secs: u64 },

    #[error("Round cancelled")]
    Cancelled,

    #[error("Session {0} already has a round in progress")]
    SessionBusy(String),

    #[error("Session {0} is closed")]
    SessionClosed(String),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// The tool manifest could not be fetched or understood.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("Discovery endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Discovery endpoint returned status {status_code}: {body}")]
    Status { status_code: u16, body: String },

    #[error("Malformed tool manifest: {0}")]
    Malformed(String),

    #[error("Duplicate tool name in manifest: {0}")]
    DuplicateTool(String),

    #[error("Tool layer not ready after {attempts} attempts")]
    NotReady { attempts: u32 },
}

/// The reasoning-service call itself failed. Fatal to the current round.
#[derive(Debug, Clone, Error)]
pub enum ReasoningError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by reasoning service, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Reasoning service not configured: {0}")]
    NotConfigured(String),
}

/// A single tool call went wrong. Recoverable: surfaced to the reasoning
/// service as data, never raised to the caller.
#[derive(Debug, Clone, Error)]
pub enum ToolInvocationError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("tool {tool_name} timed out after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("tool {tool_name} request failed: {reason}")]
    Network { tool_name: String, reason: String },

    #[error("tool {tool_name} returned a non-JSON response (status {status_code})")]
    UndecodableResponse {
        tool_name: String,
        status_code: u16,
        body: String,
    },
}

impl ToolInvocationError {
    /// Render this failure as the payload the reasoning service reads.
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::UndecodableResponse {
                status_code, body, ..
            } => serde_json::json!({
                "error": self.to_string(),
                "status": status_code,
                "body": body,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        }
    }
}
