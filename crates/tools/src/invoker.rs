//! HTTP tool invoker.
//!
//! Resolves a tool by name, dispatches on its declared method, and bounds the
//! whole exchange by a per-call timeout. Every outcome, including failures,
//! comes back as a JSON value for the reasoning service to read. Calls are
//! never retried here.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use toolbridge_config::{ToolsConfig, join_url};
use toolbridge_core::error::{Error, ToolInvocationError};
use toolbridge_core::event::{DomainEvent, EventBus};
use toolbridge_core::tool::{HttpMethod, ToolDescriptor, ToolInvoker, ToolManifest};
use tracing::{info, warn};

/// Raw bodies quoted back in error payloads are cut to this many chars.
const MAX_ERROR_BODY_CHARS: usize = 500;
const MAX_ARGS_PREVIEW_CHARS: usize = 200;

pub struct HttpToolInvoker {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl HttpToolInvoker {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> toolbridge_core::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
            event_bus: None,
        })
    }

    pub fn from_config(config: &ToolsConfig) -> toolbridge_core::Result<Self> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Publish a `ToolInvoked` event for every call.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Absolute endpoints are used verbatim; anything else is relative to the tool layer.
    fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            join_url(&self.base_url, endpoint)
        }
    }

    async fn dispatch(
        &self,
        descriptor: &ToolDescriptor,
        url: &str,
        arguments: &Value,
    ) -> Result<(u16, Value), ToolInvocationError> {
        let request = match descriptor.method {
            HttpMethod::Get => self
                .client
                .get(url)
                .query(&query_pairs(&descriptor.name, arguments)?),
            HttpMethod::Post => {
                let body = if arguments.is_null() {
                    serde_json::json!({})
                } else {
                    arguments.clone()
                };
                self.client.post(url).json(&body)
            }
        };

        let network = |e: reqwest::Error| ToolInvocationError::Network {
            tool_name: descriptor.name.clone(),
            reason: e.to_string(),
        };

        let response = request.send().await.map_err(network)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network)?;

        // Any JSON body is the tool's answer, whatever the status
        let value = serde_json::from_str(&body).map_err(|_| {
            ToolInvocationError::UndecodableResponse {
                tool_name: descriptor.name.clone(),
                status_code: status,
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            }
        })?;
        Ok((status, value))
    }

    fn publish(&self, tool_name: &str, success: bool, duration_ms: u64) {
        if let Some(ref bus) = self.event_bus {
            bus.publish(DomainEvent::ToolInvoked {
                tool_name: tool_name.to_string(),
                success,
                duration_ms,
                timestamp: Utc::now(),
            });
        }
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(&self, name: &str, arguments: &Value, manifest: &ToolManifest) -> Value {
        let start = Instant::now();

        let Some(descriptor) = manifest.resolve(name) else {
            warn!(
                tool = name,
                args = %args_preview(arguments),
                outcome = "unknown_tool",
                "Requested tool is not in the manifest"
            );
            self.publish(name, false, 0);
            return ToolInvocationError::UnknownTool(name.to_string()).to_payload();
        };

        let url = self.endpoint_url(&descriptor.endpoint);
        let result = tokio::time::timeout(self.timeout, self.dispatch(descriptor, &url, arguments))
            .await
            .unwrap_or_else(|_| {
                Err(ToolInvocationError::Timeout {
                    tool_name: name.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            });

        let (value, outcome) = match result {
            Ok((status, value)) => {
                let outcome = if !(200..300).contains(&status) || value.get("error").is_some() {
                    "error_payload"
                } else {
                    "ok"
                };
                (value, outcome)
            }
            Err(e) => {
                let outcome = match &e {
                    ToolInvocationError::Timeout { .. } => "timeout",
                    ToolInvocationError::Network { .. } => "network_error",
                    ToolInvocationError::UnknownTool(_) => "unknown_tool",
                    _ => "error_payload",
                };
                (e.to_payload(), outcome)
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            tool = name,
            endpoint = %url,
            method = %descriptor.method,
            args = %args_preview(arguments),
            outcome,
            duration_ms,
            "Tool invoked"
        );
        self.publish(name, outcome == "ok", duration_ms);

        value
    }
}

/// Flatten a GET argument object into query pairs.
///
/// Strings pass verbatim, nulls are skipped, anything else is sent as its JSON text.
fn query_pairs(tool_name: &str, arguments: &Value) -> Result<Vec<(String, String)>, ToolInvocationError> {
    match arguments {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((key.clone(), s.clone())),
                other => Some((key.clone(), other.to_string())),
            })
            .collect()),
        other => Err(ToolInvocationError::InvalidArguments {
            tool_name: tool_name.to_string(),
            reason: format!("GET arguments must be an object, got {}", json_kind(other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn args_preview(arguments: &Value) -> String {
    truncate(&arguments.to_string(), MAX_ARGS_PREVIEW_CHARS)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
