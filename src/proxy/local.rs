//! Locally computed JSON-RPC methods
//!
//! These answer from the signer registry without contacting the downstream
//! node: the account list, EIP-191 message signing, and transaction signing
//! without submission.

use serde_json::{json, Value};
use tracing::warn;

use crate::eth::address::prefixed;
use crate::eth::signer::eip191_hash;
use crate::eth::transaction::{TransactionRequest, UnsignedTransaction};
use crate::rpc::{JsonRpcRequest, JsonRpcResponse, RpcErrorCode};

use super::AppState;

/// `eth_accounts`: sorted, deduplicated list of addresses with a registered
/// signer. Takes no parameters.
pub async fn eth_accounts(state: &AppState, request: &JsonRpcRequest) -> JsonRpcResponse {
    let param_count = request.params_list().map(|l| l.len()).unwrap_or_else(|| {
        usize::from(!request.params.is_null())
    });
    if param_count != 0 {
        return RpcErrorCode::InvalidParams.to_response(request.id());
    }

    let accounts: Vec<String> =
        state.provider.available_addresses().await.iter().map(|a| prefixed(a)).collect();
    JsonRpcResponse::success(request.id(), json!(accounts))
}

/// `eth_sign`: sign an arbitrary message with the EIP-191 personal prefix.
/// Params: `[address, data]`, both hex strings.
pub async fn eth_sign(state: &AppState, request: &JsonRpcRequest) -> JsonRpcResponse {
    let Some([address, data]) = request.params_list().map(|l| l.as_slice()).and_then(two_strings)
    else {
        return RpcErrorCode::InvalidParams.to_response(request.id());
    };

    let stripped = data.strip_prefix("0x").unwrap_or(data);
    let Ok(message) = hex::decode(stripped) else {
        return RpcErrorCode::InvalidParams.to_response(request.id());
    };

    let Some(signer) = state.provider.get_signer(address).await else {
        return RpcErrorCode::SigningFromNotAvailable.to_response(request.id());
    };

    match signer.sign_hash(&eip191_hash(&message)).await {
        Ok(signature) => JsonRpcResponse::success(
            request.id(),
            json!(format!("0x{}", hex::encode(signature.to_bytes()))),
        ),
        Err(e) => {
            warn!(error = %e, "Message signing failed");
            RpcErrorCode::InternalError.to_response(request.id())
        }
    }
}

/// `eth_signTransaction`: sign without submitting. The nonce must be supplied
/// by the caller; this method never contacts the downstream node to fill one
/// in.
pub async fn eth_sign_transaction(state: &AppState, request: &JsonRpcRequest) -> JsonRpcResponse {
    let Ok(tx_request) = TransactionRequest::from_params(request.unwrapped_params()) else {
        return RpcErrorCode::InvalidParams.to_response(request.id());
    };

    let (Ok(from), Ok(Some(nonce))) = (tx_request.from_address(), tx_request.nonce()) else {
        return RpcErrorCode::InvalidParams.to_response(request.id());
    };

    let Some(signer) = state.provider.get_signer(from).await else {
        return RpcErrorCode::SigningFromNotAvailable.to_response(request.id());
    };

    let Ok(unsigned) = UnsignedTransaction::from_request(&tx_request, nonce, state.chain_id)
    else {
        return RpcErrorCode::InvalidParams.to_response(request.id());
    };

    match signer.sign_hash(&unsigned.signing_hash()).await {
        Ok(signature) => {
            let raw = unsigned.raw_signed(&signature);
            JsonRpcResponse::success(request.id(), json!(format!("0x{}", hex::encode(&raw))))
        }
        Err(e) => {
            warn!(error = %e, "Transaction signing failed");
            RpcErrorCode::InternalError.to_response(request.id())
        }
    }
}

fn two_strings(params: &[Value]) -> Option<[&str; 2]> {
    match params {
        [first, second] => Some([first.as_str()?, second.as_str()?]),
        _ => None,
    }
}
