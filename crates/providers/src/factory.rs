//! Builds the configured reasoning service.

use std::sync::Arc;
use std::time::Duration;
use toolbridge_config::ReasoningConfig;
use toolbridge_core::error::ReasoningError;
use toolbridge_core::reasoning::ReasoningService;
use crate::anthropic::AnthropicReasoner;

/// Build the reasoning service named by `config.provider`.
///
/// Fails with `NotConfigured` when the provider is unknown or no API key is
/// available.
pub fn build_from_config(
    config: &ReasoningConfig,
) -> Result<Arc<dyn ReasoningService>, ReasoningError> {
    match config.provider.as_str() {
        "anthropic" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                ReasoningError::NotConfigured(
                    "no API key: set reasoning.api_key or ANTHROPIC_API_KEY".into(),
                )
            })?;

            let mut reasoner =
                AnthropicReasoner::new(api_key, Duration::from_secs(config.timeout_secs))?
                    .with_model(&config.model);
            if let Some(ref base_url) = config.base_url {
                reasoner = reasoner.with_base_url(base_url);
            }
            Ok(Arc::new(reasoner))
        }
        other => Err(ReasoningError::NotConfigured(format!(
            "unknown reasoning provider: {other}"
        ))),
    }
}
