//! JSON-RPC method router
//!
//! Stateless dispatch on the `method` string. Three dispositions: locally
//! computed responses, the sign-and-forward pipeline, and verbatim
//! pass-through for everything else, so the proxy stays useful for methods it
//! does not know. Malformed bodies are rejected before dispatch.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, warn};

use crate::rpc::JsonRpcRequest;

use super::{local, send, AppState};

/// Single JSON-RPC endpoint handler
pub async fn handle_rpc(State(state): State<AppState>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Rejecting malformed request body");
            return (StatusCode::BAD_REQUEST, "Malformed JSON-RPC request").into_response();
        }
    };

    debug!(method = %request.method, "Dispatching request");
    match request.method.as_str() {
        // Local responses: answered from the registry, no downstream call
        "eth_accounts" => Json(local::eth_accounts(&state, &request).await).into_response(),
        "eth_sign" => Json(local::eth_sign(&state, &request).await).into_response(),
        "eth_signTransaction" => {
            Json(local::eth_sign_transaction(&state, &request).await).into_response()
        }

        // Sign-and-forward pipeline
        "eth_sendTransaction" | "eea_sendTransaction" => {
            send::send_transaction(&state, &request).await
        }

        // Everything else, known or not, passes through unmodified
        _ => pass_through(&state, body).await,
    }
}

async fn pass_through(state: &AppState, body: Bytes) -> Response {
    match state.downstream.forward(body).await {
        Ok(relayed) => send::relay(relayed),
        Err(e) => {
            warn!(error = %e, "Pass-through failed");
            (StatusCode::BAD_GATEWAY, "Downstream node unreachable").into_response()
        }
    }
}
