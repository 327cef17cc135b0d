// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests against an in-process server over real sockets.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use pulse::auth::Signer;
use pulse::config::PulseConfig;
use pulse::protocol::{epoch_ms, Frame, Kind};
use pulse_client::{Agent, AgentState, SignedToken, WsConnector};
use pulse_specs::{PulseServer, TIMEOUT};

const QUIET: Duration = Duration::from_millis(200);

// -- Harness ------------------------------------------------------------------

#[test]
fn ensure_crypto_installs_ring_provider() {
    pulse_specs::ensure_crypto();
    pulse_specs::ensure_crypto();
    assert!(rustls::crypto::CryptoProvider::get_default().is_some());
}

// -- Protocol -----------------------------------------------------------------

#[tokio::test]
async fn greeting_carries_client_id() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let a = server.connect().await?;
    let b = server.connect().await?;
    assert!(!a.client_id.is_empty());
    assert_ne!(a.client_id, b.client_id);
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn ping_is_answered_without_auth() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let mut client = server.connect().await?;

    let before = epoch_ms();
    client.send(&Frame::ping(1)).await?;
    let pong = client.recv().await?;
    assert_eq!(pong.kind, Kind::Heartbeat);
    assert_eq!(pong.event.as_str(), "pong");
    assert!(pong.data["timestamp"].as_u64().unwrap_or_default() >= before);
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn malformed_text_keeps_connection_open() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let mut client = server.connect().await?;

    client.send_text("{not json").await?;
    let error = client.recv().await?;
    assert_eq!(error.kind, Kind::Error);
    assert_eq!(error.data["code"], "INVALID_MESSAGE");

    client.send(&Frame::ping(2)).await?;
    assert_eq!(client.recv().await?.event.as_str(), "pong");
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn frames_are_handled_in_order() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let mut alice = server.login("alice").await?;

    alice.event("game:join", json!({"gameId": "g1"})).await?;
    alice.event("game:leave", json!({})).await?;
    alice.event("game:join", json!({"gameId": "g2"})).await?;

    for expected in ["g1", "g1", "g2"] {
        let ack = alice.recv().await?;
        assert_eq!(ack.kind, Kind::Ack);
        assert_eq!(ack.data["gameId"], expected);
    }
    server.shutdown().await;
    Ok(())
}

// -- Auth ---------------------------------------------------------------------

#[tokio::test]
async fn login_with_self_issued_token() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let mut client = server.connect().await?;

    client.send(&server.login_frame("alice")).await?;
    let reply = client.recv().await?;
    assert_eq!(reply.kind, Kind::Auth);
    assert_eq!(reply.event.as_str(), "success");
    assert_eq!(reply.data["userId"], "alice");
    assert_eq!(reply.data["clientId"], client.client_id.as_str());

    let health: serde_json::Value =
        reqwest::get(format!("{}/health", server.base_url())).await?.json().await?;
    assert_eq!(health["connections"], 1);
    assert_eq!(health["authenticated"], 1);
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn bad_signature_fails_then_closes_after_grace() -> anyhow::Result<()> {
    let mut config = PulseConfig::test();
    config.auth_grace_ms = 300;
    let server = PulseServer::start_with(config).await?;
    let mut client = server.connect().await?;

    let forged = Signer::new(b"wrong-secret").credential(server.token("alice"), epoch_ms());
    client.send(&Frame::login(&forged)).await?;
    let reply = client.recv().await?;
    assert_eq!(reply.event.as_str(), "failed");
    assert_eq!(reply.data["code"], "AUTH_FAILED");

    client.closed().await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stale_credential_is_rejected() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let mut client = server.connect().await?;

    let secret = server.config().auth_secret.clone().unwrap_or_default();
    let stale = Signer::new(secret.as_bytes())
        .credential(server.token("alice"), epoch_ms().saturating_sub(6 * 60 * 1000));
    client.send(&Frame::login(&stale)).await?;
    let reply = client.recv().await?;
    assert_eq!(reply.data["code"], "AUTH_FAILED");
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unauthenticated_game_join_is_refused() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let mut client = server.connect().await?;

    client.event("game:join", json!({"gameId": "g1"})).await?;
    let error = client.recv().await?;
    assert_eq!(error.kind, Kind::Error);
    assert_eq!(
        error.data,
        json!({"code": "UNAUTHORIZED", "message": "Must be authenticated to join games"})
    );
    server.shutdown().await;
    Ok(())
}

// -- Broadcast ----------------------------------------------------------------

#[tokio::test]
async fn status_reaches_authenticated_connections_only() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let mut alice = server.login("alice").await?;
    let mut bob = server.login("bob").await?;
    let mut anon = server.connect().await?;

    alice.event("user:status", json!({"status": "away"})).await?;
    for client in [&mut alice, &mut bob] {
        let frame = client.recv().await?;
        assert_eq!(frame.event.as_str(), "user:status");
        assert_eq!(frame.data, json!({"userId": "alice", "status": "away"}));
    }
    assert!(anon.is_quiet(QUIET).await);
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn game_state_stays_in_room() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let mut alice = server.login("alice").await?;
    let mut bob = server.login("bob").await?;
    let mut carol = server.login("carol").await?;

    alice.event("game:join", json!({"gameId": "g1"})).await?;
    alice.recv().await?;
    bob.event("game:join", json!({"gameId": "g1"})).await?;
    bob.recv().await?;
    let joined = alice.recv().await?;
    assert_eq!(joined.event.as_str(), "game:player_joined");
    assert_eq!(joined.data["userId"], "bob");

    alice.event("game:state", json!({"state": {"turn": 1}})).await?;
    let relayed = bob.recv().await?;
    assert_eq!(relayed.event.as_str(), "game:state");
    assert_eq!(relayed.data, json!({"gameId": "g1", "userId": "alice", "state": {"turn": 1}}));

    assert!(carol.is_quiet(QUIET).await);
    assert!(alice.is_quiet(QUIET).await);
    server.shutdown().await;
    Ok(())
}

// -- Transport ----------------------------------------------------------------

#[tokio::test]
async fn upgrade_on_wrong_path_is_aborted() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let url = format!("ws://{}/not-the-socket", server.addr());
    let result = tokio::time::timeout(TIMEOUT, tokio_tungstenite::connect_async(url)).await?;
    assert!(result.is_err());

    let mut raw = TcpStream::connect(server.addr()).await?;
    raw.write_all(
        b"GET /other HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n",
    )
    .await?;
    // Dropped without a response; a reset is as good as a clean close.
    let mut buf = Vec::new();
    let _ = tokio::time::timeout(TIMEOUT, raw.read_to_end(&mut buf)).await?;
    assert!(buf.is_empty());
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_open_sockets() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let mut alice = server.login("alice").await?;
    let mut anon = server.connect().await?;

    server.shutdown().await;
    alice.closed().await?;
    anon.closed().await?;
    Ok(())
}

// -- Client agent -------------------------------------------------------------

#[tokio::test]
async fn agent_connects_and_authenticates() -> anyhow::Result<()> {
    let server = PulseServer::start().await?;
    let mut peer = server.login("bob").await?;

    let secret = server.config().auth_secret.clone().unwrap_or_default();
    let agent = Arc::new(
        Agent::new(WsConnector::new(server.ws_url()))
            .with_credentials(SignedToken::new(secret.as_bytes(), server.token("alice"))),
    );
    let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
    agent.observers().on("user:status", move |frame: &Frame| {
        let _ = seen_tx.send(frame.data.clone());
    });

    let runner = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.run().await })
    };

    let mut state = agent.state();
    tokio::time::timeout(TIMEOUT, state.wait_for(|s| *s == AgentState::Authenticated)).await??;

    peer.event("user:status", json!({"status": "busy"})).await?;
    let seen = tokio::time::timeout(TIMEOUT, seen_rx.recv()).await?;
    assert_eq!(seen, Some(json!({"userId": "bob", "status": "busy"})));

    agent.send(pulse::protocol::EventName::new("user:status")?, json!({"status": "here"}))?;
    // Bob sees his own broadcast first.
    assert_eq!(peer.recv().await?.data["userId"], "bob");
    assert_eq!(peer.recv().await?.data, json!({"userId": "alice", "status": "here"}));

    agent.stop();
    assert_eq!(runner.await?, Ok(()));
    server.shutdown().await;
    Ok(())
}
