//! JSON-RPC 2.0 envelope.
//!
//! Only the subset a client needs: outbound requests and notifications,
//! inbound responses and notifications. Batching is not part of the MCP
//! streaming profile and is not supported.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// JSON-RPC version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Zero-sized marker that serializes as the literal `"2.0"` and rejects
/// anything else on deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "Invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// Request identifier.
///
/// The client only ever issues numeric ids, assigned monotonically per
/// session and never reused, so correlation is strict: a response whose id
/// does not parse as a number was not produced for one of our requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// JSON-RPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Request identifier, echoed back by the server.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request for `method` with the given id and parameters.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC notification message (no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Method name.
    pub method: String,
    /// Notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification for `method` with the given parameters.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// Response payload: result or error, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Successful response.
    Success {
        /// The method result.
        result: Value,
    },
    /// Error response.
    Error {
        /// The error object.
        error: JsonRpcError,
    },
}

/// JSON-RPC response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Either `result` or `error`.
    #[serde(flatten)]
    pub payload: ResponsePayload,
    /// Identifier of the request this answers. `None` only for server-side
    /// parse errors, which cannot be correlated and are dropped.
    pub id: Option<RequestId>,
}

impl JsonRpcResponse {
    /// The result value, if this is a success response.
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Success { result } => Some(result),
            ResponsePayload::Error { .. } => None,
        }
    }

    /// The error object, if this is an error response.
    pub fn error(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Success { .. } => None,
            ResponsePayload::Error { error } => Some(error),
        }
    }

    /// Consume the response into `Ok(result)` or `Err(error)`.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.payload {
            ResponsePayload::Success { result } => Ok(result),
            ResponsePayload::Error { error } => Err(error),
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new error object.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A unit parsed off the receive stream.
///
/// Server-initiated *requests* (elicitation, sampling) are outside this
/// client's scope; for lack of a `result`/`error` member they fall into the
/// [`InboundFrame::Notification`] arm, where the reader logs and drops them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    /// A response correlating to one of our requests.
    Response(JsonRpcResponse),
    /// A server-pushed notification.
    Notification(JsonRpcNotification),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape() {
        let req = JsonRpcRequest::new(RequestId(7), "tools/list", None);
        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire, json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}));
    }

    #[test]
    fn response_success_parses() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#).unwrap();
        let InboundFrame::Response(resp) = frame else {
            panic!("expected response frame");
        };
        assert_eq!(resp.id, Some(RequestId(3)));
        assert!(resp.error().is_none());
        assert_eq!(resp.result().unwrap()["tools"], json!([]));
    }

    #[test]
    fn response_error_parses() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn notification_frame_has_no_id() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#,
        )
        .unwrap();
        assert!(matches!(frame, InboundFrame::Notification(_)));
    }

    #[test]
    fn version_mismatch_rejected() {
        let parsed: Result<JsonRpcRequest, _> =
            serde_json::from_str(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#);
        assert!(parsed.is_err());
    }
}
