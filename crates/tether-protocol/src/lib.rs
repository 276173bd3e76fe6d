//! # Tether Protocol
//!
//! Wire types for the tether MCP client: the JSON-RPC 2.0 envelope and the
//! MCP schema types a client needs for the initialize handshake, capability
//! discovery, and tool invocation.
//!
//! This crate is deliberately transport-agnostic. Frames are plain serde
//! types; how they move across the network is the concern of
//! `tether-transport`, and correlation of requests to responses is the
//! concern of `tether-client`.
//!
//! ## What's Inside
//!
//! - [`jsonrpc`]: request/response/notification envelope, error objects,
//!   and the inbound frame union parsed off the stream
//! - [`types`]: `initialize` handshake payloads, capability sets,
//!   tool/prompt/resource descriptors, and tool-call results

pub mod jsonrpc;
pub mod types;

pub use jsonrpc::{
    InboundFrame, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcVersion, RequestId, ResponsePayload,
};
pub use types::{
    CallToolParams, CallToolResult, CapabilitySet, ClientCapabilities, ContentBlock,
    Implementation, InitializeParams, InitializeResult, ListPromptsResult, ListResourcesResult,
    ListToolsResult, PromptArgument, PromptDescriptor, ResourceDescriptor, ServerCapabilities,
    ToolDescriptor, ToolInputSchema,
};

/// MCP protocol revision this client speaks.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Maximum accepted frame size in bytes. Frames beyond this are dropped by
/// the transports rather than buffered.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// MCP method names used by the client.
pub mod methods {
    /// Capability handshake, first request on every session.
    pub const INITIALIZE: &str = "initialize";
    /// Notification acknowledging a completed handshake.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Best-effort notification that a request was abandoned.
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Liveness probe.
    pub const PING: &str = "ping";
    /// Tool discovery.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Prompt discovery.
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Resource discovery.
    pub const RESOURCES_LIST: &str = "resources/list";
    /// Tool invocation.
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Standard JSON-RPC 2.0 error codes.
pub mod codes {
    /// Invalid JSON was received by the server.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}
