//! Sign-and-forward transaction pipeline
//!
//! Steps per request: parse and validate params, resolve the signer, resolve
//! the nonce, build and sign, forward as a raw transaction, and retry on a
//! nonce conflict. A conflict forces a fresh nonce fetch (any caller-supplied
//! nonce is discarded) and resubmits through the same routine; the loop is
//! bounded by the configured retry limit rather than recursing without one.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, warn};

use crate::eth::address::parse_address;
use crate::eth::transaction::{TransactionRequest, UnsignedTransaction};
use crate::rpc::{is_nonce_too_low, JsonRpcRequest, RpcErrorCode};

use super::downstream::RelayedResponse;
use super::AppState;

/// Handle `eth_sendTransaction` / `eea_sendTransaction`
pub async fn send_transaction(state: &AppState, request: &JsonRpcRequest) -> Response {
    match run_pipeline(state, request).await {
        Ok(relayed) => relay(relayed),
        Err(code) => {
            debug!(code = code.code(), method = %request.method, "Signing pipeline failed");
            (StatusCode::OK, axum::Json(code.to_response(request.id()))).into_response()
        }
    }
}

async fn run_pipeline(
    state: &AppState,
    request: &JsonRpcRequest,
) -> Result<RelayedResponse, RpcErrorCode> {
    // Parse & validate: terminal, never retried
    let tx_request = TransactionRequest::from_params(request.unwrapped_params())
        .map_err(|_| RpcErrorCode::InvalidParams)?;
    let from = tx_request.from_address().map_err(|_| RpcErrorCode::InvalidParams)?;
    let sender = parse_address(from).map_err(|_| RpcErrorCode::InvalidParams)?;
    let caller_nonce = tx_request.nonce().map_err(|_| RpcErrorCode::InvalidParams)?;

    // Resolve the signer before anything touches the network
    let signer = state
        .provider
        .get_signer(from)
        .await
        .ok_or(RpcErrorCode::SigningFromNotAvailable)?;

    let raw_method = if tx_request.is_private() {
        "eea_sendRawTransaction"
    } else {
        "eth_sendRawTransaction"
    };

    // After a nonce conflict the caller's nonce is stale by definition
    let mut use_caller_nonce = caller_nonce.is_some();

    for attempt in 0..=state.nonce_retry_limit {
        // Resolve nonce: exactly one transaction-count query per attempt
        let nonce = match caller_nonce {
            Some(nonce) if use_caller_nonce => nonce,
            _ => state.downstream.transaction_count(&sender).await.map_err(|e| {
                warn!(error = %e, "Nonce lookup failed");
                RpcErrorCode::InternalError
            })?,
        };

        // Build & sign
        let unsigned = UnsignedTransaction::from_request(&tx_request, nonce, state.chain_id)
            .map_err(|_| RpcErrorCode::InvalidParams)?;
        let signature = signer.sign_hash(&unsigned.signing_hash()).await.map_err(|e| {
            warn!(error = %e, "Transaction signing failed");
            RpcErrorCode::InternalError
        })?;
        let raw_hex = format!("0x{}", hex::encode(unsigned.raw_signed(&signature)));

        // Forward, reusing the caller's request id
        let relayed = state
            .downstream
            .send_raw(raw_method, request.id(), &raw_hex)
            .await
            .map_err(|e| {
                warn!(error = %e, "Raw transaction submission failed");
                RpcErrorCode::InternalError
            })?;

        // Only a nonce conflict is retried; everything else is relayed as-is
        let nonce_conflict = relayed
            .as_json_rpc()
            .and_then(|r| r.error)
            .is_some_and(|e| is_nonce_too_low(&e));

        if nonce_conflict && attempt < state.nonce_retry_limit {
            info!(nonce, attempt, "Nonce conflict, resubmitting with a fresh nonce");
            use_caller_nonce = false;
            continue;
        }
        return Ok(relayed);
    }

    // The loop always returns from its final iteration
    Err(RpcErrorCode::InternalError)
}

/// Relay a downstream response verbatim: status, headers, and body
/// byte-for-byte. The client already decoded the body, so the framing
/// headers (`Content-Length`, `Transfer-Encoding`, `Connection`) are
/// recomputed for the relayed copy rather than replayed.
pub fn relay(relayed: RelayedResponse) -> Response {
    let status = StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, relayed.body).into_response();
    response.headers_mut().remove(header::CONTENT_TYPE);
    for (name, value) in &relayed.headers {
        if name == header::CONTENT_LENGTH
            || name == header::TRANSFER_ENCODING
            || name == header::CONNECTION
        {
            continue;
        }
        response.headers_mut().append(name, value.clone());
    }
    response
}
