//! Context augmentation: best-effort enrichment of a user utterance.
//!
//! An augmenter turns a query into a context block that is prepended to the
//! utterance before reasoning. The signature is infallible: an implementation
//! that hits an error logs it and returns an empty string.

use async_trait::async_trait;

#[async_trait]
pub trait ContextAugmenter: Send + Sync {
    /// Context for `query`, or an empty string when there is none.
    async fn augment(&self, query: &str) -> String;
}

/// The guaranteed-empty augmenter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAugmentation;

#[async_trait]
impl ContextAugmenter for NoAugmentation {
    async fn augment(&self, _query: &str) -> String {
        String::new()
    }
}

/// Prefix `utterance` with `context`, if any.
pub fn merge_context(context: &str, utterance: &str) -> String {
    let context = context.trim();
    if context.is_empty() {
        utterance.to_string()
    } else {
        format!("{context}\n\n{utterance}")
    }
}
