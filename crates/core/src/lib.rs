//! # toolbridge core
//!
//! Domain types, seams, and error definitions for the toolbridge orchestrator.
//! This crate has **no transport dependencies**: it defines the conversation
//! model and the traits the other crates implement against.
//!
//! ## Seams
//!
//! - [`ReasoningService`] decides, per request, between a final answer and tool calls
//! - [`ToolInvoker`] executes one tool call and always hands back a JSON value
//! - [`ContextAugmenter`] enriches a user utterance, degrading to an empty string
//!
//! Everything network-facing lives behind one of these, so the orchestration
//! loop can be driven entirely by stubs in tests.

pub mod augment;
pub mod error;
pub mod event;
pub mod message;
pub mod reasoning;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use augment::{ContextAugmenter, NoAugmentation};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{ContentBlock, Role, SessionId, ToolCallRequest, ToolCallResult, Turn, TurnKind};
pub use reasoning::{ReasoningRequest, ReasoningResponse, ReasoningService, ToolSpec};
pub use tool::{HttpMethod, ToolDescriptor, ToolInvoker, ToolManifest};
