// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoint: one read loop and one writer task per connection.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use tokio::time::Instant;

use crate::dispatch::sweep::report_runtime_fault;
use crate::error::ErrorCode;
use crate::protocol::Frame;
use crate::registry::{Connection, Outbox, Transport};
use crate::state::PulseState;

/// `GET <ws_path>`: promote the request to a frame stream.
pub async fn ws_handler(
    State(state): State<Arc<PulseState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, socket))
}

async fn handle_connection(state: Arc<PulseState>, socket: WebSocket) {
    let (transport, outbox) = Transport::channel();
    let conn = state.registry.register(transport).await;
    tracing::info!(conn_id = %conn.id(), "connection opened");

    let (ws_tx, ws_rx) = socket.split();
    let writer = tokio::spawn(write_loop(ws_tx, outbox));

    let read = AssertUnwindSafe(read_loop(&state, &conn, ws_rx)).catch_unwind().await;
    if let Err(panic) = read {
        tracing::error!(
            conn_id = %conn.id(),
            "connection task panicked: {}",
            crate::dispatch::panic_message(panic.as_ref())
        );
        report_runtime_fault(&state.registry).await;
    }

    state.registry.remove(conn.id()).await;
    let _ = writer.await;
    let lifetime_ms = Instant::now().saturating_duration_since(conn.connected_at()).as_millis() as u64;
    tracing::info!(conn_id = %conn.id(), lifetime_ms, "connection closed");
}

/// Read frames in arrival order, awaiting each dispatch before the next read.
async fn read_loop(state: &PulseState, conn: &Arc<Connection>, mut ws_rx: SplitStream<WebSocket>) {
    let closed = conn.closed_token();
    loop {
        let msg = tokio::select! {
            _ = closed.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(text))) => {
                state.dispatcher.handle_text(conn, text.as_str()).await;
            }
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => state.dispatcher.handle_text(conn, text).await,
                Err(_) => {
                    conn.touch();
                    conn.send(Frame::error(ErrorCode::InvalidMessage, "Frames must be UTF-8 text"));
                }
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => conn.touch(),
            Some(Err(e)) => {
                tracing::warn!(conn_id = %conn.id(), code = %ErrorCode::ConnectionError, "transport error: {e}");
                break;
            }
        }
    }
}

/// Drain the outbox into the socket until the transport closes.
async fn write_loop(mut ws_tx: SplitSink<WebSocket, Message>, mut outbox: Outbox) {
    while let Some(frame) = outbox.recv().await {
        if ws_tx.send(Message::Text(frame.encode().into())).await.is_err() {
            return;
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}
