//! Turn and transcript domain types.
//!
//! These are the value objects that flow through a round:
//! user utterance → assistant turn (text or tool requests) → tool-result turn → ... → final answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The end user
    User,
    /// The reasoning service
    Assistant,
    /// Results of tool invocations, fed back to the reasoning service
    ToolResult,
}

/// A tool invocation requested by the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque correlation token, echoed back in the matching result
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Structured input
    pub arguments: serde_json::Value,
}

/// The outcome of one tool invocation.
///
/// `value` is either the tool's success payload or an `{"error": ...}` shape;
/// both are plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// The request id this result answers
    pub id: String,

    pub value: serde_json::Value,
}

impl ToolCallResult {
    /// Whether the payload is an error shape (`{"error": ...}`).
    pub fn is_error(&self) -> bool {
        self.value.get("error").is_some()
    }
}

/// A block of assistant content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse(ToolCallRequest),
}

/// The role-specific body of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnKind {
    User { content: String },
    Assistant { content: Vec<ContentBlock> },
    ToolResult { results: Vec<ToolCallResult> },
}

/// A single entry in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    #[serde(flatten)]
    pub kind: TurnKind,

    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn with_kind(kind: TurnKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_kind(TurnKind::User {
            content: content.into(),
        })
    }

    /// Create an assistant turn holding only text.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_kind(TurnKind::Assistant {
            content: vec![ContentBlock::Text { text: text.into() }],
        })
    }

    /// Create an assistant turn from raw blocks (text and/or tool requests).
    pub fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self::with_kind(TurnKind::Assistant { content })
    }

    /// Create a tool-result turn. `results` must already be in request order.
    pub fn tool_results(results: Vec<ToolCallResult>) -> Self {
        Self::with_kind(TurnKind::ToolResult { results })
    }

    pub fn role(&self) -> Role {
        match self.kind {
            TurnKind::User { .. } => Role::User,
            TurnKind::Assistant { .. } => Role::Assistant,
            TurnKind::ToolResult { .. } => Role::ToolResult,
        }
    }

    /// User-visible text of this turn. Text blocks are joined with newlines;
    /// tool-result turns have none.
    pub fn text(&self) -> String {
        match &self.kind {
            TurnKind::User { content } => content.clone(),
            TurnKind::Assistant { content } => join_text(content),
            TurnKind::ToolResult { .. } => String::new(),
        }
    }

    /// Tool requests carried by an assistant turn, in emission order.
    pub fn tool_requests(&self) -> Vec<&ToolCallRequest> {
        match &self.kind {
            TurnKind::Assistant { content } => tool_requests(content),
            _ => Vec::new(),
        }
    }

    /// Whether this turn may live in a persisted transcript: user turns, and
    /// assistant turns with text and no tool requests.
    pub fn is_persistable(&self) -> bool {
        match &self.kind {
            TurnKind::User { .. } => true,
            TurnKind::Assistant { content } => {
                tool_requests(content).is_empty() && !join_text(content).trim().is_empty()
            }
            TurnKind::ToolResult { .. } => false,
        }
    }
}

/// Concatenate the text blocks of an assistant message.
pub fn join_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::ToolUse(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The tool requests among a list of blocks.
pub fn tool_requests(blocks: &[ContentBlock]) -> Vec<&ToolCallRequest> {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse(req) => Some(req),
            ContentBlock::Text { .. } => None,
        })
        .collect()
}
