// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end tests.
//!
//! Runs a real pulse server in-process on an ephemeral port and talks to it
//! over real WebSocket connections.

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use pulse::auth::{HmacTokenVerifier, Signer};
use pulse::config::PulseConfig;
use pulse::protocol::{epoch_ms, EventName, Frame, Kind};
use pulse::RunningServer;

pub const TIMEOUT: Duration = Duration::from_secs(10);

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// A pulse server running on `127.0.0.1:<ephemeral>`.
pub struct PulseServer {
    config: PulseConfig,
    server: RunningServer,
}

impl PulseServer {
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(PulseConfig::test()).await
    }

    pub async fn start_with(config: PulseConfig) -> anyhow::Result<Self> {
        ensure_crypto();
        let server = pulse::spawn(&config, pulse::default_pipeline(&config)).await?;
        Ok(Self { config, server })
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.server.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.server.addr, self.config.ws_path)
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// A self-issued token for `subject`, valid for an hour.
    pub fn token(&self, subject: &str) -> String {
        let secret = self.config.token_secret.as_deref().unwrap_or_default();
        HmacTokenVerifier::new(
            secret.as_bytes(),
            self.config.token_issuer.clone(),
            self.config.token_audience.clone(),
        )
        .issue(subject, "socket", epoch_ms() / 1000, 3600)
    }

    /// A signed `auth:login` frame for `subject`.
    pub fn login_frame(&self, subject: &str) -> Frame {
        let secret = self.config.auth_secret.as_deref().unwrap_or_default();
        let credential = Signer::new(secret.as_bytes()).credential(self.token(subject), epoch_ms());
        Frame::login(&credential)
    }

    /// Connect a raw socket client and consume the greeting.
    pub async fn connect(&self) -> anyhow::Result<WsClient> {
        let (ws, _) = tokio_tungstenite::connect_async(self.ws_url()).await?;
        let (tx, rx) = ws.split();
        let mut client = WsClient { tx, rx, client_id: String::new() };
        let greeting = client.recv().await?;
        anyhow::ensure!(
            greeting.event.as_str() == "connection:established",
            "unexpected greeting {greeting:?}"
        );
        client.client_id = greeting.data["clientId"].as_str().unwrap_or_default().to_owned();
        Ok(client)
    }

    /// Connect and complete a login as `subject`.
    pub async fn login(&self, subject: &str) -> anyhow::Result<WsClient> {
        let mut client = self.connect().await?;
        client.send(&self.login_frame(subject)).await?;
        let reply = client.recv().await?;
        anyhow::ensure!(reply.kind == Kind::Auth && reply.event.as_str() == "success", "login failed: {reply:?}");
        Ok(client)
    }

    pub async fn shutdown(self) {
        self.server.shutdown().await;
    }
}

type WsTx = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsRx = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// A raw WebSocket client speaking frames.
pub struct WsClient {
    tx: WsTx,
    rx: WsRx,
    pub client_id: String,
}

impl WsClient {
    pub async fn send(&mut self, frame: &Frame) -> anyhow::Result<()> {
        self.send_text(&frame.encode()).await
    }

    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.tx.send(Message::Text(text.into())).await?;
        Ok(())
    }

    pub async fn event(&mut self, name: &str, data: serde_json::Value) -> anyhow::Result<()> {
        self.send(&Frame::event(EventName::new(name)?, data)).await
    }

    /// Next frame, skipping server heartbeat pings.
    pub async fn recv(&mut self) -> anyhow::Result<Frame> {
        loop {
            let msg = tokio::time::timeout(TIMEOUT, self.rx.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("socket closed"))??;
            match msg {
                Message::Text(text) => {
                    let frame = Frame::decode(text.as_str())?;
                    if frame.kind == Kind::Heartbeat && frame.event.as_str() == "ping" {
                        continue;
                    }
                    return Ok(frame);
                }
                Message::Close(_) => anyhow::bail!("socket closed"),
                _ => continue,
            }
        }
    }

    /// True if nothing arrives within `wait`.
    pub async fn is_quiet(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.rx.next()).await.is_err()
    }

    /// Wait for the server to close the socket.
    pub async fn closed(&mut self) -> anyhow::Result<()> {
        loop {
            match tokio::time::timeout(TIMEOUT, self.rx.next()).await? {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return Ok(()),
                Some(Ok(_)) => continue,
            }
        }
    }
}
