// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic liveness sweeps: server pings and idle eviction.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::panic_message;
use crate::error::ErrorCode;
use crate::protocol::{epoch_ms, Frame};
use crate::registry::Registry;

/// Sweep cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub ping_interval: Duration,
    pub eviction_interval: Duration,
    pub heartbeat_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            eviction_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(60),
        }
    }
}

/// Spawn the ping and eviction sweeps. Both stop when `shutdown` fires.
pub fn spawn_sweeps(
    registry: Arc<Registry>,
    config: SweepConfig,
    shutdown: CancellationToken,
) -> [JoinHandle<()>; 2] {
    let ping = {
        let registry = Arc::clone(&registry);
        spawn_periodic("ping", config.ping_interval, registry, shutdown.clone(), |registry| async move {
            let sent = registry.ping_all(epoch_ms()).await;
            tracing::trace!(sent, "ping sweep");
        })
    };
    let timeout = config.heartbeat_timeout;
    let evict = spawn_periodic("eviction", config.eviction_interval, registry, shutdown, move |registry| async move {
        let evicted = registry.evict_stale(Instant::now(), timeout).await;
        for id in &evicted {
            tracing::info!(conn_id = %id, "evicted idle connection");
        }
    });
    [ping, evict]
}

/// Run `tick` every `period` until cancelled.
///
/// The first run happens one period after start. A panicking tick is
/// reported to clients and the loop keeps going.
fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<Registry>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            let run = AssertUnwindSafe(tick(Arc::clone(&registry))).catch_unwind().await;
            if let Err(panic) = run {
                let detail = panic_message(panic.as_ref());
                tracing::error!(sweep = name, "sweep panicked: {detail}");
                report_runtime_fault(&registry).await;
            }
        }
        tracing::debug!(sweep = name, "sweep stopped");
    })
}

/// Tell every authenticated client that an unattributable fault occurred.
pub async fn report_runtime_fault(registry: &Registry) -> usize {
    registry
        .broadcast(Frame::error(ErrorCode::RuntimeError, "Internal server error"))
        .await
}

#[cfg(test)]
#[path = "sweep_tests.rs"]
mod tests;
