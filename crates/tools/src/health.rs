//! Startup readiness polling for the tool layer.

use std::time::Duration;
use toolbridge_core::error::DiscoveryError;
use tracing::{info, warn};

/// One GET against `url`; true on HTTP 200.
pub async fn check_health(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(resp) => resp.status().as_u16() == 200,
        Err(e) => {
            warn!(url, error = %e, "Health probe failed");
            false
        }
    }
}

/// Poll `url` until it answers 200, at most `attempts` times, sleeping
/// `interval` after each failed probe.
pub async fn wait_until_ready(
    url: &str,
    attempts: u32,
    interval: Duration,
) -> Result<(), DiscoveryError> {
    let client = reqwest::Client::builder()
        .timeout(interval.max(Duration::from_secs(1)))
        .build()
        .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;

    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        if check_health(&client, url).await {
            info!(url, attempt, "Tool layer is ready");
            return Ok(());
        }
        if attempt < attempts {
            info!(url, attempt, attempts, "Waiting for tool layer");
            tokio::time::sleep(interval).await;
        }
    }

    Err(DiscoveryError::NotReady { attempts })
}
