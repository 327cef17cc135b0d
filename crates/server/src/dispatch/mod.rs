// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame dispatch: heartbeats, the auth challenge, and the event pipeline.
//!
//! Heartbeat pings and `auth:login` are handled inline. Every `event` frame
//! runs through the middleware chain and then through each handler
//! registered for its name, one after another. Failures and panics inside
//! the pipeline become an `error` frame for the originating connection only.

pub mod middleware;
pub mod sweep;

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::auth::{AuthFailure, Authenticator, Identity};
use crate::error::{ErrorCode, HandlerError};
use crate::protocol::{epoch_ms, names, AuthCredential, EventName, Frame, Kind};
use crate::registry::{Connection, Registry};

/// Default delay before an unauthenticated socket is closed after a failed login.
pub const DEFAULT_AUTH_GRACE: Duration = Duration::from_secs(5);

/// Boxed result of a handler or middleware stage.
pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a handler sees for one inbound event.
pub struct EventContext {
    connection: Arc<Connection>,
    registry: Arc<Registry>,
    event: EventName,
    data: Value,
}

impl EventContext {
    pub fn new(
        connection: Arc<Connection>,
        registry: Arc<Registry>,
        event: EventName,
        data: Value,
    ) -> Self {
        Self { connection, registry, event, data }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn event(&self) -> &EventName {
        &self.event
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.connection.identity()
    }

    /// Decode the event payload. Failures map to `INVALID_MESSAGE`.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(T::deserialize(&self.data)?)
    }

    /// Identity of the sender, or `UNAUTHORIZED` with `message`.
    pub fn require_identity(&self, message: &str) -> Result<&Identity, HandlerError> {
        self.identity().ok_or_else(|| HandlerError::unauthorized(message))
    }

    /// Send an `event` frame back to the originator.
    pub fn reply(&self, event: EventName, data: Value) -> bool {
        self.connection.send(Frame::event(event, data))
    }

    /// Acknowledge this event to the originator.
    pub fn ack(&self, data: Value) -> bool {
        self.connection.send(Frame::ack(self.event.clone(), data))
    }
}

// ---------------------------------------------------------------------------
// Handler / middleware traits
// ---------------------------------------------------------------------------

/// An application event handler.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, ctx: Arc<EventContext>) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Arc<EventContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn call(&self, ctx: Arc<EventContext>) -> HandlerFuture {
        Box::pin(self(ctx))
    }
}

/// An interceptor in front of the handlers.
///
/// A stage passes the event on by awaiting `next.run(ctx)`. Returning
/// without doing so drops the event; returning an error rejects it.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: Arc<EventContext>, next: Next) -> HandlerFuture;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Arc<EventContext>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, ctx: Arc<EventContext>, next: Next) -> HandlerFuture {
        Box::pin(self(ctx, next))
    }
}

struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    handlers: HashMap<EventName, Vec<Arc<dyn Handler>>>,
}

/// Continuation handed to each middleware stage.
pub struct Next {
    pipeline: Arc<Pipeline>,
    index: usize,
}

impl Next {
    /// Run the remaining stages, then the handlers.
    pub fn run(self, ctx: Arc<EventContext>) -> HandlerFuture {
        match self.pipeline.middleware.get(self.index) {
            Some(stage) => {
                let stage = Arc::clone(stage);
                let next = Next { pipeline: self.pipeline, index: self.index + 1 };
                stage.handle(ctx, next)
            }
            None => Box::pin(run_handlers(self.pipeline, ctx)),
        }
    }
}

async fn run_handlers(pipeline: Arc<Pipeline>, ctx: Arc<EventContext>) -> Result<(), HandlerError> {
    let Some(handlers) = pipeline.handlers.get(ctx.event()) else {
        trace!(conn_id = %ctx.connection().id(), event = %ctx.event(), "no handler");
        return Ok(());
    };
    for handler in handlers {
        handler.call(Arc::clone(&ctx)).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Builds a [`Dispatcher`]. The pipeline is fixed once built.
pub struct DispatcherBuilder {
    middleware: Vec<Arc<dyn Middleware>>,
    handlers: HashMap<EventName, Vec<Arc<dyn Handler>>>,
    auth_grace: Duration,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self { middleware: Vec::new(), handlers: HashMap::new(), auth_grace: DEFAULT_AUTH_GRACE }
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware stage. Stages run in the order added.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Register a handler for `event`. Handlers for one name run in the order added.
    pub fn on<F, Fut>(mut self, event: EventName, handler: F) -> Self
    where
        F: Fn(Arc<EventContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handlers.entry(event).or_default().push(Arc::new(handler));
        self
    }

    pub fn auth_grace(mut self, grace: Duration) -> Self {
        self.auth_grace = grace;
        self
    }

    pub fn build(self, registry: Arc<Registry>, authenticator: Arc<Authenticator>) -> Dispatcher {
        Dispatcher {
            registry,
            authenticator,
            pipeline: Arc::new(Pipeline { middleware: self.middleware, handlers: self.handlers }),
            auth_grace: self.auth_grace,
        }
    }
}

/// Routes inbound frames for every connection.
pub struct Dispatcher {
    registry: Arc<Registry>,
    authenticator: Arc<Authenticator>,
    pipeline: Arc<Pipeline>,
    auth_grace: Duration,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Handle one inbound text message.
    ///
    /// Any inbound message counts as liveness, including one that fails to
    /// decode. Decode failures are answered with `INVALID_MESSAGE`.
    pub async fn handle_text(&self, conn: &Arc<Connection>, text: &str) {
        conn.touch();
        match Frame::decode(text) {
            Ok(frame) => self.dispatch(conn, frame).await,
            Err(e) => {
                debug!(conn_id = %conn.id(), err = %e, "rejected frame");
                conn.send(Frame::error(ErrorCode::InvalidMessage, "Invalid message format"));
            }
        }
    }

    /// Route one decoded frame.
    pub async fn dispatch(&self, conn: &Arc<Connection>, frame: Frame) {
        match frame.kind {
            Kind::Heartbeat if frame.event == names::PING => {
                conn.send(Frame::pong(epoch_ms()));
            }
            Kind::Auth if frame.event == names::LOGIN => self.login(conn, &frame).await,
            Kind::Event => self.run_event(conn, frame).await,
            _ => trace!(conn_id = %conn.id(), key = %frame.compound_key(), "ignored frame"),
        }
    }

    async fn login(&self, conn: &Arc<Connection>, frame: &Frame) {
        match self.try_login(conn, frame).await {
            Ok(identity) => {
                info!(conn_id = %conn.id(), user_id = %identity, "authenticated");
                conn.send(Frame::auth_success(conn.id().to_string(), identity.as_str()));
            }
            Err(failure) => {
                warn!(conn_id = %conn.id(), code = %failure.code(), "auth failed: {failure}");
                conn.send(Frame::auth_failed(failure.code(), failure.message()));
                if !conn.is_authenticated() {
                    self.arm_auth_grace(conn);
                }
            }
        }
    }

    async fn try_login(&self, conn: &Connection, frame: &Frame) -> Result<Identity, AuthFailure> {
        if conn.is_authenticated() {
            return Err(AuthFailure::AlreadyAuthenticated);
        }
        let credential: AuthCredential =
            frame.payload().map_err(|e| AuthFailure::Malformed(e.to_string()))?;
        let identity = self.authenticator.authenticate(&credential, epoch_ms()).await?;
        self.registry.authenticate(conn, identity.clone()).await?;
        Ok(identity)
    }

    /// Close `conn` after the grace period unless it authenticates first.
    fn arm_auth_grace(&self, conn: &Arc<Connection>) {
        let registry = Arc::clone(&self.registry);
        let conn = Arc::clone(conn);
        let grace = self.auth_grace;
        tokio::spawn(async move {
            let closed = conn.closed_token();
            tokio::select! {
                _ = closed.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    if !conn.is_authenticated() {
                        debug!(conn_id = %conn.id(), "auth grace expired, closing");
                        registry.remove(conn.id()).await;
                    }
                }
            }
        });
    }

    async fn run_event(&self, conn: &Arc<Connection>, frame: Frame) {
        let ctx = Arc::new(EventContext::new(
            Arc::clone(conn),
            Arc::clone(&self.registry),
            frame.event,
            frame.data,
        ));
        let next = Next { pipeline: Arc::clone(&self.pipeline), index: 0 };
        let error = match AssertUnwindSafe(next.run(Arc::clone(&ctx))).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(panic) => {
                warn!(
                    conn_id = %conn.id(),
                    event = %ctx.event(),
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                );
                HandlerError::failed("Internal handler error")
            }
        };
        debug!(conn_id = %conn.id(), event = %ctx.event(), code = %error.code, "event rejected: {error}");
        conn.send(Frame::error(error.code, error.message));
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
