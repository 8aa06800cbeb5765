//! Round and tool-call events.
//!
//! The orchestration loop and the tool invoker publish here; the gateway's
//! event logger is the usual observer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A round began for a session
    RoundStarted {
        session_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The reasoning service answered
    ResponseGenerated {
        session_id: String,
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was invoked
    ToolInvoked {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A round committed its final answer
    RoundCommitted {
        session_id: String,
        tool_rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// A round ended without committing
    RoundFailed {
        session_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short stable label, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoundStarted { .. } => "round_started",
            Self::ResponseGenerated { .. } => "response_generated",
            Self::ToolInvoked { .. } => "tool_invoked",
            Self::RoundCommitted { .. } => "round_committed",
            Self::RoundFailed { .. } => "round_failed",
        }
    }

    /// The session a round event belongs to. Tool events carry none.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::RoundStarted { session_id, .. }
            | Self::ResponseGenerated { session_id, .. }
            | Self::RoundCommitted { session_id, .. }
            | Self::RoundFailed { session_id, .. } => Some(session_id),
            Self::ToolInvoked { .. } => None,
        }
    }
}

/// Fan-out of domain events to any number of observers.
///
/// Slow observers lag and drop events; publishers never block.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
