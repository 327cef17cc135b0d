// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in middleware stages.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;

use super::{EventContext, HandlerFuture, Middleware, Next};
use crate::error::{ErrorCode, HandlerError};
use crate::registry::Connection;

/// Per-event span plus a completion line with timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLog;

impl Middleware for RequestLog {
    fn handle(&self, ctx: Arc<EventContext>, next: Next) -> HandlerFuture {
        let span = tracing::debug_span!(
            "event",
            conn_id = %ctx.connection().id(),
            event = %ctx.event(),
            user_id = ctx.identity().map(|i| i.as_str()),
        );
        Box::pin(
            async move {
                let started = Instant::now();
                let result = next.run(ctx).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                match &result {
                    Ok(()) => tracing::debug!(elapsed_ms, "event handled"),
                    Err(e) => tracing::debug!(elapsed_ms, code = %e.code, "event failed"),
                }
                result
            }
            .instrument(span),
        )
    }
}

/// Fixed-window limit on events per connection.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    max_events: u32,
    window: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(10))
    }
}

impl RateLimit {
    pub fn new(max_events: u32, window: Duration) -> Self {
        Self { max_events, window }
    }

    /// Count one event against `conn`. Returns `false` once the window is full.
    fn admit(&self, conn: &Connection, now: Instant) -> bool {
        let mut window = conn.rate_window();
        if now.saturating_duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        if window.count >= self.max_events {
            return false;
        }
        window.count += 1;
        true
    }
}

impl Middleware for RateLimit {
    fn handle(&self, ctx: Arc<EventContext>, next: Next) -> HandlerFuture {
        if !self.admit(ctx.connection(), Instant::now()) {
            tracing::debug!(conn_id = %ctx.connection().id(), "rate limited");
            return Box::pin(async {
                Err(HandlerError::new(ErrorCode::RateLimit, "Too many events, slow down"))
            });
        }
        next.run(ctx)
    }
}

/// Rejects unauthenticated senders of events under the given prefixes.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    prefixes: Vec<String>,
}

impl RequireAuth {
    pub fn prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { prefixes: prefixes.into_iter().map(Into::into).collect() }
    }

    fn guards(&self, ctx: &EventContext) -> bool {
        self.prefixes.iter().any(|p| ctx.event().has_prefix(p))
    }
}

impl Middleware for RequireAuth {
    fn handle(&self, ctx: Arc<EventContext>, next: Next) -> HandlerFuture {
        if self.guards(&ctx) && ctx.identity().is_none() {
            return Box::pin(async { Err(HandlerError::unauthorized("Authentication required")) });
        }
        next.run(ctx)
    }
}

#[cfg(test)]
#[path = "middleware_tests.rs"]
mod tests;
