// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the socket server.

pub mod gate;
pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::state::PulseState;
use crate::transport::gate::UpgradeGate;

/// Build the axum `Router`: the socket endpoint plus `/health`.
pub fn build_router(state: Arc<PulseState>) -> Router {
    Router::new()
        .route(&state.ws_path, get(ws::ws_handler))
        .route("/health", get(http::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accept connections until shutdown.
///
/// Every request on every stream passes the upgrade gate. When the gate
/// fires, the connection is dropped without a response.
pub async fn serve(listener: TcpListener, state: Arc<PulseState>) {
    let shutdown = state.shutdown.clone();
    let ws_path: Arc<str> = Arc::from(state.ws_path.as_str());
    let mut make_svc = build_router(state).into_make_service();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accept = listener.accept() => match accept {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::debug!("accept error: {e}");
                    continue;
                }
            },
        };

        // IntoMakeService implements Service<T> for any T
        let svc_future = <_ as tower::Service<_>>::call(&mut make_svc, ());
        let ws_path = ws_path.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let Ok(svc) = svc_future.await;
            let abort = CancellationToken::new();
            let io = TokioIo::new(stream);
            let hyper_svc = TowerToHyperService::new(UpgradeGate::new(svc, ws_path, abort.clone()));
            let builder = Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection_with_upgrades(io, hyper_svc);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = abort.cancelled() => {
                    tracing::debug!(%peer, "dropped upgrade for unknown path");
                    return;
                }
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            };
            if let Err(e) = result {
                tracing::debug!(%peer, "http connection error: {e}");
            }
        });
    }
    tracing::debug!("listener stopped");
}
