//! HTTP gateway for toolbridge.
//!
//! Serves the chat API over a shared [`OrchestrationLoop`] and one
//! lazily-loaded tool manifest. Sessions live in memory only.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::{Router, http::HeaderValue, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use toolbridge_agent::OrchestrationLoop;
use toolbridge_config::AppConfig;
use toolbridge_core::event::{DomainEvent, EventBus};
use toolbridge_tools::{HttpToolInvoker, ManifestLoader, build_augmenter, wait_until_ready};

pub use api::{ApiState, SharedApiState, api_router};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Build the orchestration loop described by `config`.
pub fn build_orchestrator(
    config: &AppConfig,
    event_bus: Arc<EventBus>,
) -> Result<OrchestrationLoop, BoxError> {
    let reasoning = toolbridge_providers::build_from_config(&config.reasoning)?;
    let invoker = HttpToolInvoker::from_config(&config.tools)?.with_event_bus(event_bus.clone());
    let augmenter = build_augmenter(&config.retrieval)?;

    Ok(OrchestrationLoop::new(
        reasoning,
        Arc::new(invoker),
        augmenter,
        config.reasoning.model.clone(),
        config.agent.system_prompt.clone(),
        event_bus,
    )
    .with_max_tool_rounds(config.agent.max_tool_rounds)
    .with_round_timeout(Duration::from_secs(config.agent.round_timeout_secs))
    .with_max_tokens(config.reasoning.max_tokens)
    .with_temperature(config.reasoning.temperature))
}

/// Wait for the tool layer, then try to preload the manifest.
///
/// Neither step is fatal: on failure the manifest is fetched lazily by the
/// first request that needs it.
pub async fn warm_up(config: &AppConfig, manifests: &ManifestLoader) {
    let tools = &config.tools;
    if let Err(e) = wait_until_ready(
        &tools.health_url(),
        tools.health_retries,
        Duration::from_secs(tools.health_interval_secs),
    )
    .await
    {
        warn!(error = %e, "Tool layer did not report healthy, continuing");
    }

    match manifests
        .load_with_retry(tools.discovery_retries, Duration::from_secs(1))
        .await
    {
        Ok(manifest) => info!(tools = manifest.len(), "Tool manifest loaded"),
        Err(e) => warn!(error = %e, "Tool manifest preload failed, will retry on demand"),
    }
}

/// Log domain events at debug level until the bus closes.
pub fn spawn_event_logger(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event.as_ref() {
                DomainEvent::ToolInvoked {
                    tool_name,
                    success,
                    duration_ms,
                    ..
                } => debug!(tool = %tool_name, success, duration_ms, "event: tool invoked"),
                DomainEvent::ResponseGenerated {
                    session_id,
                    model,
                    tokens_used,
                    ..
                } => debug!(session_id = %session_id, model = %model, tokens_used, "event: response"),
                other => debug!(
                    event = other.name(),
                    session_id = other.session_id().unwrap_or("-"),
                    "event"
                ),
            }
        }
    })
}

/// CORS policy from the configured origins. No origins means same-origin only.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        cors
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}

/// Build the full router: health check plus the chat API.
///
/// Layers applied:
/// - Request body size limit (1 MB)
/// - CORS restricted to the configured origins
/// - HTTP trace logging
pub fn build_router(state: SharedApiState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(api_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors_layer(allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), BoxError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let event_bus = Arc::new(EventBus::default());
    let _events = spawn_event_logger(&event_bus);

    let orchestrator = build_orchestrator(&config, event_bus)?;
    let manifests = ManifestLoader::from_config(&config.tools)?;

    if config.gateway.wait_for_tools {
        warm_up(&config, &manifests).await;
    }

    let state = Arc::new(ApiState::new(
        Arc::new(orchestrator),
        Arc::new(manifests),
        config.gateway.max_sessions,
    ));
    let app = build_router(state, &config.gateway.allowed_origins);

    info!(
        address = %addr,
        model = %config.reasoning.model,
        tools_url = %config.tools.base_url,
        "Gateway starting"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
