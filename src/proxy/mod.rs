//! The signing proxy HTTP service
//!
//! A single axum endpoint accepts JSON-RPC 2.0 POST bodies and dispatches
//! them through the method router. The signer registry is the only state
//! shared with the directory watcher; everything else here is per-request.

pub mod downstream;
pub mod local;
pub mod routes;
pub mod send;
pub mod trace;

pub use downstream::{Downstream, DownstreamError};

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{middleware, routing::post, Router};
use tracing::info;

use crate::config::ProxyArgs;
use crate::registry::{DirectoryWatcher, SignerProvider};

/// Shared state behind every request handler
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn SignerProvider>,
    pub downstream: Downstream,
    pub chain_id: u64,
    pub nonce_retry_limit: u32,
}

/// Build the axum app with the single JSON-RPC route and tracing middleware
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", post(routes::handle_rpc))
        .layer(middleware::from_fn(trace::trace_request))
        .with_state(state)
}

/// Serve until interrupted, then stop the watcher so the OS watch handle is
/// released deterministically.
pub async fn run(
    args: &ProxyArgs,
    provider: Arc<dyn SignerProvider>,
    watcher: Option<DirectoryWatcher>,
) -> Result<()> {
    let downstream = Downstream::new(
        &args.downstream_host,
        args.downstream_port,
        args.downstream_tls,
        args.downstream_timeout(),
    )
    .context("Failed to build downstream client")?;

    let state = AppState {
        provider,
        downstream,
        chain_id: args.chain_id,
        nonce_retry_limit: args.nonce_retry_limit,
    };
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind((args.listen_host.as_str(), args.listen_port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", args.listen_host, args.listen_port))?;
    info!(
        listen = %format!("{}:{}", args.listen_host, args.listen_port),
        downstream = %format!("{}:{}", args.downstream_host, args.downstream_port),
        chain_id = args.chain_id,
        "Signing proxy listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(watcher) = watcher {
        watcher.stop();
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
