//! Tool descriptors, the manifest, and the invoker seam.
//!
//! Tools are externally hosted HTTP endpoints discovered at runtime. The
//! manifest maps each tool name to where and how it is called; only the
//! name/description/schema projection ever reaches the reasoning service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::error::DiscoveryError;
use crate::reasoning::ToolSpec;

/// The HTTP methods a tool endpoint may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(format!("unsupported method: {other}")),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the orchestrator knows about one tool. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique name (the manifest key)
    pub name: String,

    /// Path relative to the tool layer, or an absolute URL
    pub endpoint: String,

    pub method: HttpMethod,

    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,

    /// Description sent to the reasoning service
    pub description: String,
}

impl ToolDescriptor {
    /// Project into what the reasoning service may see.
    pub fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Wire shape of one descriptor as served by the discovery endpoint.
#[derive(Debug, Deserialize)]
struct RawDescriptor {
    name: String,
    endpoint: String,
    method: String,
    #[serde(alias = "inputSchema")]
    input_schema: serde_json::Value,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    tools: Vec<RawDescriptor>,
}

/// The set of discovered tools, keyed by name.
///
/// Read-only after construction; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ToolManifest {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolManifest {
    /// Build a manifest from descriptors. Names must be unique.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = ToolDescriptor>,
    ) -> Result<Self, DiscoveryError> {
        let mut tools = HashMap::new();
        for descriptor in descriptors {
            if descriptor.name.trim().is_empty() {
                return Err(DiscoveryError::Malformed("tool with empty name".into()));
            }
            if tools.contains_key(&descriptor.name) {
                return Err(DiscoveryError::DuplicateTool(descriptor.name));
            }
            tools.insert(descriptor.name.clone(), descriptor);
        }
        Ok(Self { tools })
    }

    /// Parse the discovery endpoint's `{"tools": [...]}` body.
    ///
    /// Descriptors declaring a method other than GET or POST are dropped with
    /// a warning; they never become callable.
    pub fn from_json(body: &str) -> Result<Self, DiscoveryError> {
        let raw: RawManifest =
            serde_json::from_str(body).map_err(|e| DiscoveryError::Malformed(e.to_string()))?;

        let mut descriptors = Vec::with_capacity(raw.tools.len());
        for tool in raw.tools {
            let method = match tool.method.parse::<HttpMethod>() {
                Ok(m) => m,
                Err(reason) => {
                    tracing::warn!(tool = %tool.name, %reason, "Skipping tool with unsupported method");
                    continue;
                }
            };
            descriptors.push(ToolDescriptor {
                name: tool.name,
                endpoint: tool.endpoint,
                method,
                input_schema: tool.input_schema,
                description: tool.description,
            });
        }

        Self::from_descriptors(descriptors)
    }

    /// Pure lookup.
    pub fn resolve(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// The reasoning-service projection, sorted by name.
    pub fn to_reasoning_format(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(ToolDescriptor::to_spec).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    /// All descriptors, sorted by name.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut all: Vec<&ToolDescriptor> = self.tools.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Executes a single tool call.
///
/// Never fails: unknown tools, timeouts, network errors and undecodable
/// responses all come back as an `{"error": ...}` value.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        manifest: &ToolManifest,
    ) -> serde_json::Value;
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "tools": [
            {
                "name": "calculate_margin",
                "endpoint": "/calculate_margin",
                "method": "POST",
                "description": "Compute profit margin",
                "input_schema": {
                    "type": "object",
                    "properties": {
                        "revenue": {"type": "number"},
                        "cost": {"type": "number"}
                    },
                    "required": ["revenue", "cost"]
                }
            },
            {
                "name": "hello",
                "endpoint": "/hello",
                "method": "get",
                "inputSchema": {"type": "object", "properties": {}}
            }
        ]
    }"#;

    #[test]
    fn parse_manifest() {
        let manifest = ToolManifest::from_json(MANIFEST).unwrap();
        assert_eq!(manifest.len(), 2);

        let margin = manifest.resolve("calculate_margin").unwrap();
        assert_eq!(margin.method, HttpMethod::Post);
        assert_eq!(margin.endpoint, "/calculate_margin");

        let hello = manifest.resolve("hello").unwrap();
        assert_eq!(hello.method, HttpMethod::Get);
        assert!(hello.description.is_empty());
    }

    #[test]
    fn resolve_missing_tool() {
        let manifest = ToolManifest::from_json(MANIFEST).unwrap();
        assert!(manifest.resolve("nonexistent").is_none());
    }

    #[test]
    fn projection_strips_routing() {
        let manifest = ToolManifest::from_json(MANIFEST).unwrap();
        let specs = manifest.to_reasoning_format();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "calculate_margin");
        assert_eq!(specs[1].name, "hello");

        let json = serde_json::to_string(&specs).unwrap();
        assert!(!json.contains("endpoint"));
        assert!(!json.contains("/calculate_margin"));
        assert!(!json.contains("POST"));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let body = r#"{"tools": [{"name": "x", "method": "GET", "input_schema": {}}]}"#;
        let err = ToolManifest::from_json(body).unwrap_err();
        assert!(matches!(err, DiscoveryError::Malformed(_)));
    }

    #[test]
    fn missing_tools_key_is_malformed() {
        let err = ToolManifest::from_json(r#"{"items": []}"#).unwrap_err();
        assert!(matches!(err, DiscoveryError::Malformed(_)));
    }

    #[test]
    fn unsupported_method_is_dropped_at_load() {
        let body = r#"{"tools": [
            {"name": "wipe", "endpoint": "/wipe", "method": "DELETE", "input_schema": {}},
            {"name": "ok", "endpoint": "/ok", "method": "GET", "input_schema": {}}
        ]}"#;
        let manifest = ToolManifest::from_json(body).unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.resolve("wipe").is_none());
    }

    #[test]
    fn duplicate_names_rejected() {
        let body = r#"{"tools": [
            {"name": "a", "endpoint": "/a", "method": "GET", "input_schema": {}},
            {"name": "a", "endpoint": "/b", "method": "POST", "input_schema": {}}
        ]}"#;
        let err = ToolManifest::from_json(body).unwrap_err();
        assert!(matches!(err, DiscoveryError::DuplicateTool(name) if name == "a"));
    }

    #[test]
    fn method_parsing() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(" GET ".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert!("PATCH".parse::<HttpMethod>().is_err());
        assert_eq!(HttpMethod::Post.to_string(), "POST");
    }
}
