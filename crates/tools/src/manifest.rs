//! Tool manifest discovery.
//!
//! The manifest is fetched from the tool layer's discovery endpoint on first
//! use and cached for the life of the loader. `reload()` is the only way to
//! pick up a changed tool set.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use toolbridge_config::ToolsConfig;
use toolbridge_core::error::{DiscoveryError, Error};
use toolbridge_core::tool::ToolManifest;
use tracing::{debug, info, warn};

/// Lazily fetches and caches the [`ToolManifest`].
pub struct ManifestLoader {
    client: reqwest::Client,
    discovery_url: String,
    cache: Mutex<Option<Arc<ToolManifest>>>,
}

impl ManifestLoader {
    pub fn new(
        discovery_url: impl Into<String>,
        timeout: Duration,
    ) -> toolbridge_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            discovery_url: discovery_url.into(),
            cache: Mutex::new(None),
        })
    }

    pub fn from_config(config: &ToolsConfig) -> toolbridge_core::Result<Self> {
        Self::new(
            config.discovery_url(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    /// Return the cached manifest, fetching it on first call.
    ///
    /// Concurrent first callers wait on the same fetch. A failed fetch leaves
    /// the cache empty so the next call tries again.
    pub async fn load(&self) -> Result<Arc<ToolManifest>, DiscoveryError> {
        let mut cache = self.cache.lock().await;
        if let Some(manifest) = cache.as_ref() {
            return Ok(manifest.clone());
        }

        let manifest = Arc::new(self.fetch().await?);
        *cache = Some(manifest.clone());
        Ok(manifest)
    }

    /// Discard the cache and fetch again.
    ///
    /// On failure the previous manifest stays in place.
    pub async fn reload(&self) -> Result<Arc<ToolManifest>, DiscoveryError> {
        let mut cache = self.cache.lock().await;
        let manifest = Arc::new(self.fetch().await?);
        *cache = Some(manifest.clone());
        info!(tools = manifest.len(), "Tool manifest reloaded");
        Ok(manifest)
    }

    /// The cached manifest, if one has been loaded.
    pub async fn cached(&self) -> Option<Arc<ToolManifest>> {
        self.cache.lock().await.clone()
    }

    /// `load()` with up to `attempts` tries and linear backoff between them.
    pub async fn load_with_retry(
        &self,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Arc<ToolManifest>, DiscoveryError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.load().await {
                Ok(manifest) => return Ok(manifest),
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "Tool discovery failed, retrying");
                    tokio::time::sleep(backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch and parse the manifest without touching the cache.
    pub async fn fetch(&self) -> Result<ToolManifest, DiscoveryError> {
        debug!(url = %self.discovery_url, "Fetching tool manifest");

        let response = self
            .client
            .get(&self.discovery_url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;

        if status != 200 {
            return Err(DiscoveryError::Status {
                status_code: status,
                body,
            });
        }

        let manifest = ToolManifest::from_json(&body)?;
        info!(tools = manifest.len(), url = %self.discovery_url, "Discovered tools");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use std::sync::atomic::{AtomicU32, Ordering};

    const MANIFEST: &str = r#"{"tools": [
        {"name": "calculate_margin", "endpoint": "/calculate_margin", "method": "POST",
         "description": "Compute margin", "input_schema": {"type": "object"}},
        {"name": "hello", "endpoint": "/hello", "method": "GET", "input_schema": {}}
    ]}"#;

    /// Discovery stub that fails with 503 for the first `fail_first` hits.
    async fn discovery_stub(fail_first: u32, body: &'static str) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/tools",
            get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < fail_first {
                        (StatusCode::SERVICE_UNAVAILABLE, "starting".to_string())
                    } else {
                        (StatusCode::OK, body.to_string())
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/tools"), hits)
    }

    fn loader(url: String) -> ManifestLoader {
        ManifestLoader::new(url, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let (url, hits) = discovery_stub(0, MANIFEST).await;
        let loader = loader(url);

        let first = loader.load().await.unwrap();
        let second = loader.load().await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_loads_share_one_fetch() {
        let (url, hits) = discovery_stub(0, MANIFEST).await;
        let loader = Arc::new(loader(url));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let loader = loader.clone();
                tokio::spawn(async move { loader.load().await.unwrap().len() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 2);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reload_refetches() {
        let (url, hits) = discovery_stub(0, MANIFEST).await;
        let loader = loader(url);

        loader.load().await.unwrap();
        loader.reload().await.unwrap();
        loader.load().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_status_is_reported_and_not_cached() {
        let (url, hits) = discovery_stub(1, MANIFEST).await;
        let loader = loader(url);

        let err = loader.load().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Status { status_code: 503, .. }));
        assert!(loader.cached().await.is_none());

        assert_eq!(loader.load().await.unwrap().len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_manifest() {
        let (url, _) = discovery_stub(0, r#"{"tools": [{"name": "x"}]}"#).await;
        let err = loader(url).load().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Malformed(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint() {
        let err = loader("http://127.0.0.1:1/tools".into())
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Unreachable(_)));
    }

    #[tokio::test]
    async fn retry_recovers_from_startup_failures() {
        let (url, hits) = discovery_stub(2, MANIFEST).await;
        let manifest = loader(url)
            .load_with_retry(3, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up() {
        let (url, hits) = discovery_stub(10, MANIFEST).await;
        let err = loader(url)
            .load_with_retry(2, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Status { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
