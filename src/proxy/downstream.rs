//! Outbound JSON-RPC client for the downstream node
//!
//! One client serves both dispositions: verbatim pass-through of the original
//! request body, and the pipeline's own calls (nonce lookup, raw-transaction
//! submission). Calls are bounded by the configured request timeout; a timeout
//! surfaces as a transport error and is not retried.

use std::time::Duration;

use alloy_primitives::Address;
use axum::body::Bytes;
use axum::http::HeaderMap;
use serde_json::{json, Value};
use tracing::debug;

use crate::eth::address::{canonical, prefixed};
use crate::eth::transaction::parse_quantity;
use crate::rpc::{JsonRpcRequest, JsonRpcResponse};

/// Errors talking to the downstream node
#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    #[error("Downstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Downstream returned a malformed response: {0}")]
    BadResponse(String),
    #[error("Downstream error {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// A relayed downstream HTTP response: status and headers plus verbatim body
/// bytes
#[derive(Debug, Clone)]
pub struct RelayedResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RelayedResponse {
    /// Parse the relayed body as a JSON-RPC envelope, if it is one
    pub fn as_json_rpc(&self) -> Option<JsonRpcResponse> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// HTTP client for the configured downstream node
#[derive(Clone)]
pub struct Downstream {
    client: reqwest::Client,
    url: String,
}

impl Downstream {
    pub fn new(host: &str, port: u16, tls: bool, timeout: Duration) -> Result<Self, DownstreamError> {
        let scheme = if tls { "https" } else { "http" };
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: format!("{scheme}://{host}:{port}/") })
    }

    /// Forward a request body unmodified, relaying status and body verbatim
    pub async fn forward(&self, body: Bytes) -> Result<RelayedResponse, DownstreamError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        debug!(status, "Relayed downstream response");
        Ok(RelayedResponse { status, headers, body })
    }

    /// Issue one of the proxy's own JSON-RPC calls and decode the envelope
    pub async fn call(&self, request: &JsonRpcRequest) -> Result<Value, DownstreamError> {
        let relayed = self.forward(encode_body(request)?).await?;
        let response = relayed
            .as_json_rpc()
            .ok_or_else(|| DownstreamError::BadResponse(format!("status {}", relayed.status)))?;

        if let Some(error) = response.error {
            return Err(DownstreamError::Rpc { code: error.code, message: error.message });
        }
        response.result.ok_or_else(|| {
            DownstreamError::BadResponse("response carries neither result nor error".to_string())
        })
    }

    /// The sender's transaction count at the latest block
    pub async fn transaction_count(&self, address: &Address) -> Result<u64, DownstreamError> {
        let request = JsonRpcRequest::new(
            json!(1),
            "eth_getTransactionCount",
            json!([prefixed(&canonical(address)), "latest"]),
        );
        let result = self.call(&request).await?;

        let quantity = result
            .as_str()
            .and_then(parse_quantity)
            .and_then(|q| u64::try_from(q).ok())
            .ok_or_else(|| {
                DownstreamError::BadResponse(format!("bad transaction count {result}"))
            })?;
        Ok(quantity)
    }

    /// Submit a raw transaction, reusing the caller's original request id
    pub async fn send_raw(
        &self,
        method: &str,
        id: Value,
        raw_hex: &str,
    ) -> Result<RelayedResponse, DownstreamError> {
        let request = JsonRpcRequest::new(id, method, json!([raw_hex]));
        self.forward(encode_body(&request)?).await
    }
}

fn encode_body(request: &JsonRpcRequest) -> Result<Bytes, DownstreamError> {
    serde_json::to_vec(request)
        .map(Bytes::from)
        .map_err(|e| DownstreamError::BadResponse(e.to_string()))
}
