//! JSON-RPC 2.0 envelope types
//!
//! One framing quirk matters for dispatch: a `params` array containing exactly
//! one element is treated as if that element were passed directly. The router
//! and pipeline read params through [`JsonRpcRequest::unwrapped_params`] so
//! both `{"params": {...}}` and `{"params": [{...}]}` behave identically.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC 2.0 request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: Value, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    /// The request id, defaulting to null when absent
    pub fn id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }

    /// Params with the single-element-array unwrap applied
    pub fn unwrapped_params(&self) -> &Value {
        match self.params.as_array() {
            Some(list) if list.len() == 1 => &list[0],
            _ => &self.params,
        }
    }

    /// Params as a positional list, for methods taking several arguments
    pub fn params_list(&self) -> Option<&Vec<Value>> {
        self.params.as_array()
    }
}

/// A JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id, result: Some(result), error: None }
    }

    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id, result: None, error: Some(error) }
    }
}
