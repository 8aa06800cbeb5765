//! Anthropic Messages API reasoning service.
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use toolbridge_core::error::ReasoningError;
use toolbridge_core::message::{ContentBlock, ToolCallRequest, Turn, TurnKind};
use toolbridge_core::reasoning::{
    ReasoningRequest, ReasoningResponse, ReasoningService, ToolSpec, Usage,
};
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

/// Reasoning service backed by Anthropic's Messages API.
pub struct AnthropicReasoner {
    name: String,
    base_url: String,
    api_key: String,
    /// Model used by `health_check`; rounds use the model on each request.
    model: String,
    client: reqwest::Client,
}

impl AnthropicReasoner {
    /// Create a new Anthropic reasoner with a per-request timeout.
    pub fn new(
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, ReasoningError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReasoningError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            client,
        })
    }

    /// Use a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Convert the working conversation to Anthropic messages.
    ///
    /// Tool-result turns travel as `user` messages carrying `tool_result`
    /// blocks whose content is the JSON-encoded result value.
    fn to_api_messages(conversation: &[Turn]) -> Vec<AnthropicMessage> {
        conversation
            .iter()
            .map(|turn| match &turn.kind {
                TurnKind::User { content } => AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Text(content.clone()),
                },
                TurnKind::Assistant { content } => {
                    let blocks = content
                        .iter()
                        .map(|block| match block {
                            ContentBlock::Text { text } => ApiBlock::Text { text: text.clone() },
                            ContentBlock::ToolUse(req) => ApiBlock::ToolUse {
                                id: req.id.clone(),
                                name: req.name.clone(),
                                input: req.arguments.clone(),
                            },
                        })
                        .collect();
                    AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    }
                }
                TurnKind::ToolResult { results } => AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Blocks(
                        results
                            .iter()
                            .map(|r| ApiBlock::ToolResult {
                                tool_use_id: r.id.clone(),
                                content: r.value.to_string(),
                                is_error: r.is_error(),
                            })
                            .collect(),
                    ),
                },
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolSpec]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect()
    }

    fn build_body(request: &ReasoningRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.conversation),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });

        if !request.system_prompt.is_empty() {
            body["system"] = serde_json::json!(request.system_prompt);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    /// Convert an Anthropic API response into a reasoning response.
    fn to_reasoning_response(resp: AnthropicResponse) -> ReasoningResponse {
        let content = resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(ContentBlock::Text { text }),
                ResponseBlock::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolUse(ToolCallRequest {
                        id,
                        name,
                        arguments: input,
                    }))
                }
                ResponseBlock::Other => None,
            })
            .collect();

        ReasoningResponse {
            content,
            usage: resp.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
            model: resp.model,
            stop_reason: resp.stop_reason,
        }
    }

    fn map_send_error(e: reqwest::Error) -> ReasoningError {
        if e.is_timeout() {
            ReasoningError::Timeout(e.to_string())
        } else {
            ReasoningError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl ReasoningService for AnthropicReasoner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ReasoningRequest,
    ) -> std::result::Result<ReasoningResponse, ReasoningError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(&request);

        debug!(
            service = "anthropic",
            model = %request.model,
            turns = request.conversation.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ReasoningError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(ReasoningError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ReasoningError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: AnthropicResponse = response.json().await.map_err(|e| {
            ReasoningError::MalformedResponse(format!("Failed to parse Anthropic response: {e}"))
        })?;

        Ok(Self::to_reasoning_response(api_resp))
    }

    async fn health_check(&self) -> std::result::Result<bool, ReasoningError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 1,
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        // Reachable counts as healthy unless the key is rejected
        let status = response.status().as_u16();
        Ok(status != 401 && status != 403)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ApiBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Block types we do not act on (e.g. `thinking`).
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use toolbridge_core::message::ToolCallResult;

    fn reasoner() -> AnthropicReasoner {
        AnthropicReasoner::new("sk-ant-test", Duration::from_secs(5)).unwrap()
    }

    fn request(conversation: Vec<Turn>) -> ReasoningRequest {
        ReasoningRequest {
            model: "claude-3-haiku-20240307".into(),
            system_prompt: "You are a business analyst.".into(),
            conversation,
            tools: vec![ToolSpec {
                name: "calculate_margin".into(),
                description: "Compute profit margin".into(),
                input_schema: serde_json::json!({"type": "object"}),
            }],
            max_tokens: Some(1024),
            temperature: 0.7,
        }
    }

    /// Serve `status` + `body` on /v1/messages and record the request bodies.
    async fn stub_server(
        status: StatusCode,
        body: serde_json::Value,
    ) -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let app = Router::new().route(
            "/v1/messages",
            post(move |Json(req): Json<serde_json::Value>| {
                let recorder = recorder.clone();
                let body = body.clone();
                async move {
                    recorder.lock().unwrap().push(req);
                    (status, Json(body))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[test]
    fn constructor_with_base_url() {
        let r = reasoner().with_base_url("https://custom.proxy.com/");
        assert_eq!(r.name(), "anthropic");
        assert_eq!(r.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn user_and_assistant_conversion() {
        let msgs =
            AnthropicReasoner::to_api_messages(&[Turn::user("Hello"), Turn::assistant("Hi!")]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "user");
        assert!(matches!(&msgs[0].content, AnthropicContent::Text(t) if t == "Hello"));
        assert_eq!(msgs[1].role, "assistant");
    }

    #[test]
    fn tool_use_and_result_conversion() {
        let conversation = vec![
            Turn::user("margin for 200/150?"),
            Turn::assistant_blocks(vec![
                ContentBlock::Text {
                    text: "Let me compute".into(),
                },
                ContentBlock::ToolUse(ToolCallRequest {
                    id: "toolu_1".into(),
                    name: "calculate_margin".into(),
                    arguments: serde_json::json!({"revenue": 200, "cost": 150}),
                }),
            ]),
            Turn::tool_results(vec![ToolCallResult {
                id: "toolu_1".into(),
                value: serde_json::json!({"margin_percent": 25.0}),
            }]),
        ];

        let msgs = AnthropicReasoner::to_api_messages(&conversation);
        assert_eq!(msgs.len(), 3);

        match &msgs[1].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert!(matches!(&blocks[1], ApiBlock::ToolUse { id, input, .. }
                    if id == "toolu_1" && input["revenue"] == 200));
            }
            _ => panic!("Expected blocks content"),
        }

        assert_eq!(msgs[2].role, "user");
        match &msgs[2].content {
            AnthropicContent::Blocks(blocks) => match &blocks[0] {
                ApiBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    assert_eq!(tool_use_id, "toolu_1");
                    let value: serde_json::Value = serde_json::from_str(content).unwrap();
                    assert_eq!(value["margin_percent"], 25.0);
                    assert!(!is_error);
                }
                _ => panic!("Expected tool_result block"),
            },
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn error_result_is_flagged() {
        let msgs = AnthropicReasoner::to_api_messages(&[Turn::tool_results(vec![
            ToolCallResult {
                id: "toolu_9".into(),
                value: serde_json::json!({"error": "unknown tool: nope"}),
            },
        ])]);
        let json = serde_json::to_value(&msgs[0]).unwrap();
        assert_eq!(json["content"][0]["type"], "tool_result");
        assert_eq!(json["content"][0]["is_error"], true);
    }

    #[test]
    fn request_body_shape() {
        let body = AnthropicReasoner::build_body(&request(vec![Turn::user("hi")]));
        assert_eq!(body["system"], "You are a business analyst.");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["tools"][0]["name"], "calculate_margin");
        assert!(body["tools"][0].get("endpoint").is_none());
    }

    #[test]
    fn parse_tool_use_response() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_02",
                "model": "claude-3-haiku-20240307",
                "content": [
                    {"type": "text", "text": "Let me calculate"},
                    {"type": "tool_use", "id": "toolu_a", "name": "calculate_margin", "input": {"revenue": 200, "cost": 150}},
                    {"type": "tool_use", "id": "toolu_b", "name": "hello", "input": {}}
                ],
                "usage": {"input_tokens": 20, "output_tokens": 10},
                "stop_reason": "tool_use"
            }"#,
        )
        .unwrap();

        let r = AnthropicReasoner::to_reasoning_response(resp);
        assert!(!r.is_final());
        let requests = r.tool_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].id, "toolu_a");
        assert_eq!(requests[1].name, "hello");
        assert_eq!(r.joined_text(), "Let me calculate");
        assert_eq!(r.usage.unwrap().total(), 30);
    }

    #[test]
    fn unknown_blocks_are_ignored() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "model": "claude-3-haiku-20240307",
                "content": [
                    {"type": "thinking", "thinking": "hmm"},
                    {"type": "text", "text": "Here's my answer."}
                ]
            }"#,
        )
        .unwrap();
        let r = AnthropicReasoner::to_reasoning_response(resp);
        assert!(r.is_final());
        assert_eq!(r.joined_text(), "Here's my answer.");
    }

    #[tokio::test]
    async fn complete_against_stub() {
        let (url, seen) = stub_server(
            StatusCode::OK,
            serde_json::json!({
                "model": "claude-3-haiku-20240307",
                "content": [{"type": "text", "text": "Hello!"}],
                "usage": {"input_tokens": 3, "output_tokens": 2},
                "stop_reason": "end_turn"
            }),
        )
        .await;

        let r = reasoner().with_base_url(url);
        let resp = r.complete(request(vec![Turn::user("hi")])).await.unwrap();
        assert_eq!(resp.joined_text(), "Hello!");

        let bodies = seen.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["messages"][0]["content"], "hi");
    }

    #[tokio::test]
    async fn status_mapping() {
        let (url, _) = stub_server(StatusCode::UNAUTHORIZED, serde_json::json!({})).await;
        let err = reasoner()
            .with_base_url(url)
            .complete(request(vec![Turn::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReasoningError::AuthenticationFailed(_)));

        let (url, _) = stub_server(StatusCode::TOO_MANY_REQUESTS, serde_json::json!({})).await;
        let err = reasoner()
            .with_base_url(url)
            .complete(request(vec![Turn::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReasoningError::RateLimited { .. }));

        let (url, _) = stub_server(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": "overloaded"}),
        )
        .await;
        let err = reasoner()
            .with_base_url(url)
            .complete(request(vec![Turn::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReasoningError::ApiError { status_code: 500, .. }));
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let (url, _) = stub_server(StatusCode::OK, serde_json::json!({"unexpected": true})).await;
        let err = reasoner()
            .with_base_url(url)
            .complete(request(vec![Turn::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReasoningError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_is_network_error() {
        let err = reasoner()
            .with_base_url("http://127.0.0.1:1")
            .complete(request(vec![Turn::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ReasoningError::Network(_)));
    }

    #[tokio::test]
    async fn health_check_uses_configured_model() {
        let (url, seen) = stub_server(StatusCode::OK, serde_json::json!({})).await;
        let healthy = reasoner()
            .with_base_url(url)
            .with_model("claude-3-5-sonnet-latest")
            .health_check()
            .await
            .unwrap();
        assert!(healthy);
        assert_eq!(seen.lock().unwrap()[0]["model"], "claude-3-5-sonnet-latest");

        let (url, _) = stub_server(StatusCode::UNAUTHORIZED, serde_json::json!({})).await;
        assert!(!reasoner().with_base_url(url).health_check().await.unwrap());
    }
}
