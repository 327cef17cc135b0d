// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client reconnection agent.
//!
//! Owns one logical connection to a pulse server. On every successful open
//! it starts a heartbeat emitter and, when a credential source is set, sends
//! `auth:login` before anything else. Lost connections are retried on the
//! [`ReconnectPolicy`] schedule; the attempt counter resets on each
//! successful open, and the agent gives up with
//! [`AgentError::RetriesExhausted`] once the schedule runs out.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pulse::protocol::{epoch_ms, EventName, Frame, Kind};

use crate::backoff::ReconnectPolicy;
use crate::credential::CredentialSource;
use crate::observers::Observers;

/// Default interval between client heartbeat pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(25);

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Disconnected,
    Connecting,
    /// Transport open, no identity yet.
    Connected,
    Authenticated,
    /// Retries exhausted. Terminal.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    Connect(String),
    Transport(String),
    NotConnected,
    RetriesExhausted { attempts: u32 },
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(e) => write!(f, "connect failed: {e}"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::NotConnected => f.write_str("not connected"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "gave up after {attempts} reconnect attempts")
            }
        }
    }
}

impl std::error::Error for AgentError {}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = AgentError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

/// An open text-frame transport.
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens transports for the agent.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> BoxFuture<'static, Result<Link, AgentError>>;
}

/// WebSocket connector for a `ws://` or `wss://` URL.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for WsConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Link, AgentError>> {
        let url = self.url.clone();
        async move {
            let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| AgentError::Connect(e.to_string()))?;
            let (ws_tx, ws_rx) = ws.split();

            let sink = ws_tx
                .sink_map_err(|e| AgentError::Transport(e.to_string()))
                .with(|text: String| future::ready(Ok::<_, AgentError>(Message::Text(text.into()))));
            let stream = ws_rx.filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec()).ok().map(Ok),
                    Ok(_) => None,
                    Err(e) => Some(Err(AgentError::Transport(e.to_string()))),
                })
            });
            Ok(Link { sink: Box::pin(sink), stream: Box::pin(stream) })
        }
        .boxed()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    pub policy: ReconnectPolicy,
    pub ping_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { policy: ReconnectPolicy::default(), ping_interval: DEFAULT_PING_INTERVAL }
    }
}

enum SessionEnd {
    Stopped,
    Lost(String),
}

pub struct Agent {
    connector: Arc<dyn Connector>,
    credentials: Option<Arc<dyn CredentialSource>>,
    config: AgentConfig,
    observers: Observers,
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    state: watch::Sender<AgentState>,
    cancel: CancellationToken,
}

impl Agent {
    pub fn new(connector: impl Connector) -> Self {
        let (state, _) = watch::channel(AgentState::Disconnected);
        Self {
            connector: Arc::new(connector),
            credentials: None,
            config: AgentConfig::default(),
            observers: Observers::new(),
            outbound: Mutex::new(None),
            state,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_credentials(mut self, source: impl CredentialSource) -> Self {
        self.credentials = Some(Arc::new(source));
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    pub fn state(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> AgentState {
        *self.state.borrow()
    }

    /// Queue an application event. Fails while no transport is open.
    pub fn send(&self, event: EventName, data: Value) -> Result<(), AgentError> {
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(AgentError::NotConnected)?;
        tx.send(Frame::event(event, data)).map_err(|_| AgentError::NotConnected)
    }

    /// Stop the agent. [`run`](Self::run) returns `Ok(())` once the
    /// current transport is closed.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Connect and keep reconnecting until stopped or out of attempts.
    pub async fn run(&self) -> Result<(), AgentError> {
        let mut attempt: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                self.state.send_replace(AgentState::Disconnected);
                return Ok(());
            }

            self.state.send_replace(AgentState::Connecting);
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => continue,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(link) => {
                    attempt = 0;
                    info!("connected");
                    match self.session(link).await {
                        SessionEnd::Stopped => continue,
                        SessionEnd::Lost(reason) => warn!("connection lost: {reason}"),
                    }
                }
                Err(e) => warn!(attempt, "{e}"),
            }
            self.state.send_replace(AgentState::Disconnected);

            attempt += 1;
            let Some(delay) = self.config.policy.delay(attempt) else {
                self.state.send_replace(AgentState::Failed);
                return Err(AgentError::RetriesExhausted {
                    attempts: self.config.policy.max_attempts,
                });
            };
            debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn session(&self, link: Link) -> SessionEnd {
        let Link { mut sink, mut stream } = link;
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(tx.clone());
        self.state.send_replace(AgentState::Connected);

        if let Some(ref source) = self.credentials {
            let _ = tx.send(Frame::login(&source.credential(epoch_ms())));
        }

        let period = self.config.ping_interval;
        let mut ping = tokio::time::interval_at(Instant::now() + period, period);

        let end = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break SessionEnd::Stopped,
                _ = ping.tick() => {
                    if let Err(e) = sink.send(Frame::ping(epoch_ms()).encode()).await {
                        break SessionEnd::Lost(e.to_string());
                    }
                }
                Some(frame) = rx.recv() => {
                    if let Err(e) = sink.send(frame.encode()).await {
                        break SessionEnd::Lost(e.to_string());
                    }
                }
                msg = stream.next() => match msg {
                    Some(Ok(text)) => self.receive(&text, &tx),
                    Some(Err(e)) => break SessionEnd::Lost(e.to_string()),
                    None => break SessionEnd::Lost("connection closed".to_owned()),
                },
            }
        };

        *self.outbound.lock() = None;
        let _ = sink.close().await;
        end
    }

    fn receive(&self, text: &str, tx: &mpsc::UnboundedSender<Frame>) {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("ignoring undecodable frame: {e}");
                return;
            }
        };

        match (frame.kind, frame.event.as_str()) {
            (Kind::Heartbeat, "ping") => {
                let _ = tx.send(Frame::pong(epoch_ms()));
            }
            (Kind::Auth, "success") => {
                self.state.send_replace(AgentState::Authenticated);
            }
            (Kind::Auth, "failed") | (Kind::Error, _) => {
                warn!(event = %frame.compound_key(), "server reported {}", frame.data);
            }
            _ => {}
        }
        self.observers.notify(&frame);
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
