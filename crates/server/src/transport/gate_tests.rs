// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::convert::Infallible;

use axum::http::HeaderValue;
use futures_util::future::Ready;

use super::*;

fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(*name, HeaderValue::from_static(value));
    }
    map
}

const UPGRADE: &[(&str, &str)] = &[("connection", "Upgrade"), ("upgrade", "websocket")];
const PLAIN: &[(&str, &str)] = &[("host", "localhost")];

#[yare::parameterized(
    socket_path       = { "/ws", UPGRADE, Admission::Serve },
    other_path        = { "/chat", UPGRADE, Admission::Abort },
    nested_path       = { "/ws/extra", UPGRADE, Admission::Abort },
    root              = { "/", UPGRADE, Admission::Abort },
    plain_health      = { "/health", PLAIN, Admission::Serve },
    plain_socket_path = { "/ws", PLAIN, Admission::Serve },
    plain_unknown     = { "/nope", PLAIN, Admission::Serve },
)]
fn admission(path: &str, pairs: &[(&'static str, &'static str)], expected: Admission) {
    assert_eq!(admit(path, &headers(pairs), "/ws"), expected);
}

/// Inner service that answers every request with its path.
#[derive(Clone)]
struct Echo;

impl tower::Service<Request<()>> for Echo {
    type Response = String;
    type Error = Infallible;
    type Future = Ready<Result<String, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<()>) -> Self::Future {
        future::ready(Ok(req.uri().path().to_owned()))
    }
}

fn request(path: &str, upgrade: bool) -> anyhow::Result<Request<()>> {
    let mut builder = Request::builder().uri(path);
    if upgrade {
        builder = builder.header("connection", "Upgrade").header("upgrade", "websocket");
    }
    Ok(builder.body(())?)
}

#[tokio::test]
async fn every_request_on_a_connection_is_checked() -> anyhow::Result<()> {
    use tower::Service;

    let abort = CancellationToken::new();
    let mut gate = UpgradeGate::new(Echo, Arc::from("/ws"), abort.clone());

    assert_eq!(gate.call(request("/health", false)?).await, Ok("/health".to_owned()));
    assert_eq!(gate.call(request("/ws", true)?).await, Ok("/ws".to_owned()));
    assert!(!abort.is_cancelled());

    // A later upgrade elsewhere never gets an answer and aborts the connection.
    let pending = gate.call(request("/elsewhere", true)?);
    assert!(abort.is_cancelled());
    let answered = tokio::time::timeout(std::time::Duration::from_millis(50), pending).await;
    assert!(answered.is_err());
    Ok(())
}
