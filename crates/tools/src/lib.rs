//! HTTP tool layer client for toolbridge.
//!
//! Tools live behind a separate HTTP service. This crate discovers them,
//! calls them, waits for the service to come up, and talks to the optional
//! retrieval service used for context augmentation.

pub mod health;
pub mod invoker;
pub mod manifest;
pub mod retrieval;

pub use health::{check_health, wait_until_ready};
pub use invoker::HttpToolInvoker;
pub use manifest::ManifestLoader;
pub use retrieval::{HttpContextAugmenter, build_augmenter};
