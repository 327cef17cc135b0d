// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dispatch::sweep::{spawn_sweeps, SweepConfig};
use crate::dispatch::Dispatcher;
use crate::registry::Registry;

/// Shared server state: one per process.
pub struct PulseState {
    pub registry: Arc<Registry>,
    pub dispatcher: Arc<Dispatcher>,
    pub ws_path: String,
    pub shutdown: CancellationToken,
}

impl PulseState {
    pub fn new(dispatcher: Dispatcher, ws_path: impl Into<String>, shutdown: CancellationToken) -> Self {
        Self {
            registry: Arc::clone(dispatcher.registry()),
            dispatcher: Arc::new(dispatcher),
            ws_path: ws_path.into(),
            shutdown,
        }
    }

    /// Start the ping and eviction sweeps; they stop on [`shutdown`](Self::shutdown).
    pub fn start_sweeps(&self, config: SweepConfig) {
        spawn_sweeps(Arc::clone(&self.registry), config, self.shutdown.clone());
    }

    /// Stop the sweeps, close every transport, and empty the registry. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let closed = self.registry.close_all().await;
        if closed > 0 {
            tracing::info!(closed, "closed all connections");
        }
    }
}
