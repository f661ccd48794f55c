pub mod error;
pub mod types;

pub use error::{is_nonce_too_low, RpcErrorCode};
pub use types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
