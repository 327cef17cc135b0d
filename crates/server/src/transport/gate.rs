// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upgrade gate: drops upgrade requests for any path but the socket endpoint.
//!
//! Every request on a connection passes through [`UpgradeGate`] before the
//! router sees it. An upgrade aimed elsewhere gets no HTTP response at all:
//! the gate fires the connection's abort token and the accept loop drops the
//! raw stream.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::http::{header, HeaderMap, Request};
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Serve,
    Abort,
}

/// Decide what to do with one request.
pub fn admit(path: &str, headers: &HeaderMap, ws_path: &str) -> Admission {
    if headers.contains_key(header::UPGRADE) && path != ws_path {
        Admission::Abort
    } else {
        Admission::Serve
    }
}

/// Per-connection service wrapper applying [`admit`] to each request.
#[derive(Clone)]
pub struct UpgradeGate<S> {
    inner: S,
    ws_path: Arc<str>,
    abort: CancellationToken,
}

impl<S> UpgradeGate<S> {
    pub fn new(inner: S, ws_path: Arc<str>, abort: CancellationToken) -> Self {
        Self { inner, ws_path, abort }
    }
}

impl<S, B> tower::Service<Request<B>> for UpgradeGate<S>
where
    S: tower::Service<Request<B>>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        if admit(req.uri().path(), req.headers(), &self.ws_path) == Admission::Abort {
            self.abort.cancel();
            return future::pending().boxed();
        }
        self.inner.call(req).boxed()
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
