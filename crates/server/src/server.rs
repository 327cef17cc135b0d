// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process entry points: provider setup, tracing, and the bound server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app;
use crate::auth::{Authenticator, HmacTokenVerifier, HttpSessionVerifier, IdentityResolver, Signer};
use crate::config::PulseConfig;
use crate::dispatch::middleware::{RateLimit, RequestLog, RequireAuth};
use crate::dispatch::{Dispatcher, DispatcherBuilder};
use crate::registry::Registry;
use crate::state::PulseState;
use crate::transport;

/// Install the process-wide rustls crypto provider. Safe to call repeatedly.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Initialize tracing from config.
pub fn init_tracing(config: &PulseConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Credential signer plus identity verifiers described by `config`.
pub fn build_authenticator(config: &PulseConfig) -> anyhow::Result<Authenticator> {
    let secret = config
        .auth_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("auth secret is not configured"))?;
    let signer = Signer::new(secret.as_bytes()).with_max_skew(config.max_skew());

    let mut resolver = IdentityResolver::new();
    if let Some(ref token_secret) = config.token_secret {
        resolver = resolver.with_self_issued(Arc::new(HmacTokenVerifier::new(
            token_secret.as_bytes(),
            config.token_issuer.clone(),
            config.token_audience.clone(),
        )));
    }
    if let Some(ref url) = config.session_url {
        resolver = resolver
            .with_external(Arc::new(HttpSessionVerifier::new(url.clone(), config.session_timeout())));
    }
    Ok(Authenticator::new(signer, resolver))
}

/// The standard pipeline: request logging, rate limiting, auth gating, demo handlers.
pub fn default_pipeline(config: &PulseConfig) -> DispatcherBuilder {
    let builder = Dispatcher::builder()
        .auth_grace(config.auth_grace())
        .layer(RequestLog)
        .layer(RateLimit::new(config.rate_limit_events, config.rate_limit_window()))
        .layer(RequireAuth::prefixes(["user:"]));
    app::install(builder)
}

/// A server bound to a local address and accepting connections.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub state: Arc<PulseState>,
    task: JoinHandle<()>,
}

impl RunningServer {
    /// Stop accepting, stop the sweeps, and close every connection.
    pub async fn shutdown(self) {
        self.state.shutdown().await;
        let _ = self.task.await;
    }
}

/// Bind, start the sweeps, and serve in the background.
pub async fn spawn(config: &PulseConfig, pipeline: DispatcherBuilder) -> anyhow::Result<RunningServer> {
    let authenticator = Arc::new(build_authenticator(config)?);
    let registry = Arc::new(Registry::new());
    let dispatcher = pipeline.build(registry, authenticator);
    let state = Arc::new(PulseState::new(dispatcher, config.ws_path.clone(), CancellationToken::new()));

    let listener = TcpListener::bind(config.addr()).await?;
    let addr = listener.local_addr()?;
    state.start_sweeps(config.sweep_config());
    let task = tokio::spawn(transport::serve(listener, Arc::clone(&state)));

    info!("pulse listening on {addr} (socket path {})", config.ws_path);
    Ok(RunningServer { addr, state, task })
}

/// Run the server until ctrl-c.
pub async fn run(config: PulseConfig) -> anyhow::Result<()> {
    install_crypto_provider();
    let server = spawn(&config, default_pipeline(&config)).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.shutdown().await;
    Ok(())
}
