//! HTTP retrieval augmenter.
//!
//! Asks a retrieval service for business terms related to the query and
//! renders them as a "Business Context" block. Best-effort: every failure
//! degrades to an empty string.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use toolbridge_config::RetrievalConfig;
use toolbridge_core::augment::{ContextAugmenter, NoAugmentation};
use toolbridge_core::error::Error;
use tracing::{debug, warn};

pub struct HttpContextAugmenter {
    client: reqwest::Client,
    url: String,
    top_k: usize,
}

#[derive(Debug, Serialize)]
struct RetrievalRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    #[serde(default)]
    results: Vec<RetrievedTerm>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievedTerm {
    pub term: String,
    pub definition: String,
}

impl HttpContextAugmenter {
    pub fn new(
        url: impl Into<String>,
        top_k: usize,
        timeout: Duration,
    ) -> toolbridge_core::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            top_k,
        })
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedTerm>, String> {
        let response = self
            .client
            .post(&self.url)
            .json(&RetrievalRequest {
                query,
                top_k: self.top_k,
            })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(format!("retrieval service returned status {status}"));
        }

        let body: RetrievalResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.results)
    }
}

/// Render retrieved terms as a context block; empty input renders as "".
pub fn format_context(terms: &[RetrievedTerm]) -> String {
    if terms.is_empty() {
        return String::new();
    }

    let mut context = String::from("📚 **Business Context:**\n");
    for item in terms {
        context.push_str(&format!("  • **{}**: {}\n", item.term, item.definition));
    }
    context
}

#[async_trait]
impl ContextAugmenter for HttpContextAugmenter {
    async fn augment(&self, query: &str) -> String {
        match self.retrieve(query).await {
            Ok(terms) => {
                debug!(results = terms.len(), "Retrieved business context");
                format_context(&terms)
            }
            Err(reason) => {
                warn!(url = %self.url, %reason, "Context retrieval failed, continuing without it");
                String::new()
            }
        }
    }
}

/// The augmenter selected by configuration.
pub fn build_augmenter(
    config: &RetrievalConfig,
) -> toolbridge_core::Result<Arc<dyn ContextAugmenter>> {
    match (&config.url, config.enabled) {
        (Some(url), true) => Ok(Arc::new(HttpContextAugmenter::new(
            url.clone(),
            config.top_k,
            Duration::from_secs(config.timeout_secs),
        )?)),
        _ => Ok(Arc::new(NoAugmentation)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::Value;

    async fn retrieval_stub(status: StatusCode, body: Value) -> String {
        let app = Router::new().route(
            "/search",
            post(move |Json(req): Json<Value>| {
                let body = body.clone();
                async move {
                    assert_eq!(req["top_k"], 3);
                    (status, Json(body))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/search")
    }

    fn augmenter(url: String) -> HttpContextAugmenter {
        HttpContextAugmenter::new(url, 3, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn formats_business_context() {
        let url = retrieval_stub(
            StatusCode::OK,
            serde_json::json!({"results": [
                {"term": "Gross Margin", "definition": "Revenue minus COGS over revenue", "relevance": 0.91},
                {"term": "EBITDA", "definition": "Earnings before interest, taxes, depreciation and amortization", "relevance": 0.55}
            ]}),
        )
        .await;

        let context = augmenter(url).augment("what is our margin?").await;
        assert!(context.starts_with("📚 **Business Context:**\n"));
        assert!(context.contains("  • **Gross Margin**: Revenue minus COGS over revenue\n"));
        assert!(context.contains("**EBITDA**"));
        assert!(!context.contains("0.91"));
    }

    #[tokio::test]
    async fn empty_results_are_empty_context() {
        let url = retrieval_stub(StatusCode::OK, serde_json::json!({"results": []})).await;
        assert!(augmenter(url).augment("hello").await.is_empty());
    }

    #[tokio::test]
    async fn failures_degrade_to_empty() {
        let url = retrieval_stub(StatusCode::INTERNAL_SERVER_ERROR, serde_json::json!({})).await;
        assert!(augmenter(url).augment("hello").await.is_empty());

        let url = retrieval_stub(StatusCode::OK, serde_json::json!({"results": "nope"})).await;
        assert!(augmenter(url).augment("hello").await.is_empty());

        let unreachable = augmenter("http://127.0.0.1:1/search".into());
        assert!(unreachable.augment("hello").await.is_empty());
    }

    #[tokio::test]
    async fn disabled_config_uses_no_augmentation() {
        let augmenter = build_augmenter(&RetrievalConfig::default()).unwrap();
        assert!(augmenter.augment("anything").await.is_empty());
    }
}
