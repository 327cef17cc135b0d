// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: stub verifiers, connection helpers.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::auth::{Authenticator, IdentityResolver, SessionVerifier, Signer, VerifyError};
use crate::protocol::{ErrorPayload, Frame};
use crate::registry::{Connection, Outbox, Registry, Transport};

pub const SECRET: &[u8] = b"socket-secret";

/// Session verifier accepting `sess-<user>`; `sess-down` simulates an outage.
pub struct StubSessions;

impl SessionVerifier for StubSessions {
    fn verify_session<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<String, VerifyError>> {
        async move {
            match token.strip_prefix("sess-") {
                Some("down") => Err(VerifyError::Unavailable("provider timeout".to_owned())),
                Some(user) if !user.is_empty() => Ok(user.to_owned()),
                _ => Err(VerifyError::Rejected("unknown session".to_owned())),
            }
        }
        .boxed()
    }
}

pub fn authenticator() -> Arc<Authenticator> {
    let resolver = IdentityResolver::new().with_external(Arc::new(StubSessions));
    Arc::new(Authenticator::new(Signer::new(SECRET), resolver))
}

/// Register a fresh connection and swallow its greeting.
pub async fn connect(registry: &Registry) -> (Arc<Connection>, Outbox) {
    let (transport, mut outbox) = Transport::channel();
    let conn = registry.register(transport).await;
    let _ = outbox.try_recv();
    (conn, outbox)
}

/// Every frame currently queued.
pub fn drain(outbox: &mut Outbox) -> Vec<Frame> {
    std::iter::from_fn(|| outbox.try_recv()).collect()
}

/// Decode the `{code, message}` of an error or auth-failure frame.
pub fn error_payload(frame: &Frame) -> anyhow::Result<ErrorPayload> {
    frame.payload().anyhow()
}

pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}
