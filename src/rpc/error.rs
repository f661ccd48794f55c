//! Stable JSON-RPC error codes surfaced by the proxy
//!
//! Every failure crossing the wire is one of these codes inside a JSON-RPC
//! error object; internal error types never leak past the handler layer.

use super::types::{JsonRpcError, JsonRpcResponse};
use serde_json::Value;

/// Error conditions the proxy reports to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorCode {
    /// Malformed or missing required request fields
    InvalidParams,
    /// Requested sender address has no registered signer
    SigningFromNotAvailable,
    /// Downstream rejected the raw transaction for a stale nonce
    NonceTooLow,
    /// Unexpected signing, encoding, or downstream failure
    InternalError,
}

impl RpcErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            RpcErrorCode::InvalidParams => -32602,
            RpcErrorCode::SigningFromNotAvailable => -32010,
            RpcErrorCode::NonceTooLow => -32001,
            RpcErrorCode::InternalError => -32603,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RpcErrorCode::InvalidParams => "Invalid params",
            RpcErrorCode::SigningFromNotAvailable => "Signing address is not available",
            RpcErrorCode::NonceTooLow => "Nonce too low",
            RpcErrorCode::InternalError => "Internal error",
        }
    }

    pub fn to_error(self) -> JsonRpcError {
        JsonRpcError { code: self.code(), message: self.message().to_string(), data: None }
    }

    pub fn to_response(self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::error(id, self.to_error())
    }
}

/// Whether a downstream error reports a nonce conflict.
///
/// Besu reports code `-32001`; geth reports `-32000` with a `nonce too low`
/// message, so both the code and the message text are checked.
pub fn is_nonce_too_low(error: &JsonRpcError) -> bool {
    error.code == RpcErrorCode::NonceTooLow.code()
        || error.message.to_ascii_lowercase().contains("nonce too low")
}
