//! MCP schema types used by the client.
//!
//! Field names follow the MCP wire format (camelCase via serde renames).
//! Descriptors are immutable once produced by a discovery call; the registry
//! caches them as-is and never mutates them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Handshake
// ============================================================================

/// Name and version identifying one side of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    pub version: String,
}

impl Implementation {
    /// Create a new implementation identity.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Marker for tool support.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsCapability {
    /// Whether the server emits `notifications/tools/list_changed`.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Marker for prompt support.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptsCapability {
    /// Whether the server emits `notifications/prompts/list_changed`.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Marker for resource support.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcesCapability {
    /// Whether the server supports `resources/subscribe`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// Whether the server emits `notifications/resources/list_changed`.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Capability families the client requests during the handshake.
///
/// Presence of a field means the client intends to use that family.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Tool discovery and invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Prompt discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    /// Resource discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    /// Non-standard extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

impl ClientCapabilities {
    /// Request every capability family this client can consume.
    pub fn full() -> Self {
        Self {
            tools: Some(ToolsCapability::default()),
            prompts: Some(PromptsCapability::default()),
            resources: Some(ResourcesCapability::default()),
            experimental: None,
        }
    }
}

/// Capability families the server advertises in its handshake ack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tool listing and invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Prompt templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    /// Readable resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    /// Log message push support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
    /// Non-standard extensions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
}

/// The capability families both sides agreed on, stored on the session
/// after a successful handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    /// Tool discovery and invocation.
    pub tools: bool,
    /// Prompt discovery.
    pub prompts: bool,
    /// Resource discovery.
    pub resources: bool,
}

impl CapabilitySet {
    /// Intersect what the client requested with what the server supports.
    pub fn negotiate(client: &ClientCapabilities, server: &ServerCapabilities) -> Self {
        Self {
            tools: client.tools.is_some() && server.tools.is_some(),
            prompts: client.prompts.is_some() && server.prompts.is_some(),
            resources: client.resources.is_some() && server.resources.is_some(),
        }
    }
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Protocol revision the client speaks.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Client identity.
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
    /// Capability families the client requests.
    pub capabilities: ClientCapabilities,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol revision the server selected.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server identity.
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,
    /// Capability families the server supports.
    pub capabilities: ServerCapabilities,
    /// Optional usage instructions for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ============================================================================
// Descriptors
// ============================================================================

/// JSON Schema describing a tool's expected arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Always `"object"` for tool input schemas.
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    /// Per-argument schemas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, Value>>,
    /// Names of required arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

fn object_type() -> String {
    "object".to_string()
}

/// Discovered metadata for one callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name (programmatic identifier).
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schema of the tool's arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolInputSchema,
}

/// One templatable argument of a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// Discovered metadata for one prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptDescriptor {
    /// Prompt name (programmatic identifier).
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Arguments accepted when rendering the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

/// Discovered metadata for one readable resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource name (programmatic identifier).
    pub name: String,
    /// The URI addressing this resource.
    pub uri: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type, if known.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Result of `tools/list`. Order is server-defined and preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// The discovered tools.
    pub tools: Vec<ToolDescriptor>,
}

/// Result of `prompts/list`. Order is server-defined and preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPromptsResult {
    /// The discovered prompts.
    pub prompts: Vec<PromptDescriptor>,
}

/// Result of `resources/list`. Order is server-defined and preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResourcesResult {
    /// The discovered resources.
    pub resources: Vec<ResourceDescriptor>,
}

// ============================================================================
// Tool invocation
// ============================================================================

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Name of the tool to invoke.
    pub name: String,
    /// Free-form argument map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, Value>>,
}

/// One content block of a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text payload.
        text: String,
    },
    /// Base64-encoded image data.
    Image {
        /// The base64 payload.
        data: String,
        /// MIME type of the payload.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Base64-encoded audio data.
    Audio {
        /// The base64 payload.
        data: String,
        /// MIME type of the payload.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Result of one tool invocation.
///
/// `is_error` marks a *domain-level* tool failure carried over a successful
/// protocol round trip. It is returned to the caller as data; transport and
/// protocol failures surface as errors instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Content blocks produced by the tool.
    pub content: Vec<ContentBlock>,
    /// Whether the tool itself reported failure.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Flatten the content into a single string for consumption by an LLM:
    /// text blocks joined with newlines, binary blocks rendered as a
    /// `[mime/type]` placeholder.
    pub fn text_lossy(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if !out.is_empty() {
                out.push('\n');
            }
            match block {
                ContentBlock::Text { text } => out.push_str(text),
                ContentBlock::Image { mime_type, .. } | ContentBlock::Audio { mime_type, .. } => {
                    out.push('[');
                    out.push_str(mime_type);
                    out.push(']');
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_descriptor_wire_names() {
        let wire = json!({
            "name": "search",
            "description": "Web search",
            "inputSchema": {
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }
        });
        let tool: ToolDescriptor = serde_json::from_value(wire).unwrap();
        assert_eq!(tool.name, "search");
        assert_eq!(tool.input_schema.schema_type, "object");
        assert_eq!(
            tool.input_schema.required.as_deref(),
            Some(&["query".to_string()][..])
        );
    }

    #[test]
    fn content_blocks_tagged_by_type() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "3 results..."},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"}
            ],
            "isError": false
        }))
        .unwrap();
        assert_eq!(result.content.len(), 2);
        assert!(!result.is_error);
        assert_eq!(result.text_lossy(), "3 results...\n[image/png]");
    }

    #[test]
    fn is_error_defaults_to_false() {
        let result: CallToolResult = serde_json::from_value(json!({"content": []})).unwrap();
        assert!(!result.is_error);
    }

    #[test]
    fn capability_negotiation_is_an_intersection() {
        let client = ClientCapabilities::full();
        let server = ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            ..Default::default()
        };
        let set = CapabilitySet::negotiate(&client, &server);
        assert!(set.tools);
        assert!(!set.prompts);
        assert!(!set.resources);
    }

    #[test]
    fn initialize_round_trip_field_names() {
        let params = InitializeParams {
            protocol_version: crate::PROTOCOL_VERSION.to_string(),
            client_info: Implementation::new("tether", "0.1.0"),
            capabilities: ClientCapabilities::full(),
        };
        let wire = serde_json::to_value(&params).unwrap();
        assert!(wire.get("clientInfo").is_some());
        assert!(wire.get("protocolVersion").is_some());
    }
}
