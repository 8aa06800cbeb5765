//! ReasoningService trait: the abstraction over the LLM endpoint.
//!
//! A reasoning service is handed the working conversation plus the tools it is
//! allowed to see, and answers with either final text or tool requests.
//!
//! Implementations: Anthropic Messages API (see `toolbridge-providers`), stubs in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ReasoningError;
use crate::message::{ContentBlock, ToolCallRequest, Turn, join_text, tool_requests};

/// A request to the reasoning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningRequest {
    /// The model to use (e.g., "claude-3-haiku-20240307")
    pub model: String,

    /// System instructions
    pub system_prompt: String,

    /// The working conversation, oldest first
    pub conversation: Vec<Turn>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

/// The projection of a tool descriptor that the reasoning service sees.
///
/// Endpoint and method are deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,

    pub description: String,

    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,
}

/// A response from the reasoning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningResponse {
    /// Content blocks in emission order
    pub content: Vec<ContentBlock>,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl ReasoningResponse {
    /// A response carrying only text.
    pub fn text(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            usage: None,
            model: model.into(),
            stop_reason: Some("end_turn".into()),
        }
    }

    /// A response requesting tools.
    pub fn tool_use(requests: Vec<ToolCallRequest>, model: impl Into<String>) -> Self {
        Self {
            content: requests.into_iter().map(ContentBlock::ToolUse).collect(),
            usage: None,
            model: model.into(),
            stop_reason: Some("tool_use".into()),
        }
    }

    /// Tool requests in this response, in emission order.
    pub fn tool_requests(&self) -> Vec<&ToolCallRequest> {
        tool_requests(&self.content)
    }

    /// A final answer contains no tool requests.
    pub fn is_final(&self) -> bool {
        self.tool_requests().is_empty()
    }

    /// Joined text content.
    pub fn joined_text(&self) -> String {
        join_text(&self.content)
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// The core ReasoningService trait.
///
/// The orchestration loop calls `complete()` without knowing which backend
/// answers.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// A human-readable name for this service (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send the conversation and get the next assistant message.
    async fn complete(
        &self,
        request: ReasoningRequest,
    ) -> std::result::Result<ReasoningResponse, ReasoningError>;

    /// Health check: can we reach the service?
    async fn health_check(&self) -> std::result::Result<bool, ReasoningError> {
        Ok(true)
    }
}
