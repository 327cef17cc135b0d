// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain HTTP handlers served next to the socket endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::PulseState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
    pub authenticated: usize,
}

/// `GET /health`
pub async fn health(State(state): State<Arc<PulseState>>) -> Json<HealthResponse> {
    let status = if state.shutdown.is_cancelled() { "shutting_down" } else { "running" };
    Json(HealthResponse {
        status,
        connections: state.registry.len().await,
        authenticated: state.registry.authenticated_count().await,
    })
}
