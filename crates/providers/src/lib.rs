//! Reasoning service implementations for toolbridge.
//!
//! All services implement the `toolbridge_core::ReasoningService` trait.
//! [`build_from_config`] picks one from configuration.

pub mod anthropic;
pub mod factory;

pub use anthropic::AnthropicReasoner;
pub use factory::build_from_config;
