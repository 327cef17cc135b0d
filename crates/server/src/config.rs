// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use crate::dispatch::sweep::SweepConfig;

/// Configuration for the pulse socket server.
#[derive(Debug, Clone, Parser)]
#[command(name = "pulse", version, about = "Real-time socket messaging server")]
pub struct PulseConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "PULSE_HOST")]
    pub host: String,

    /// Port to listen on (0 picks a free port).
    #[arg(long, default_value_t = 9700, env = "PULSE_PORT")]
    pub port: u16,

    /// Path that accepts WebSocket upgrades. Upgrades to any other path are dropped.
    #[arg(long, default_value = "/ws", env = "PULSE_WS_PATH")]
    pub ws_path: String,

    /// Shared secret used to sign and verify `auth:login` credentials.
    #[arg(long, env = "PULSE_AUTH_SECRET", hide_env_values = true)]
    pub auth_secret: Option<String>,

    /// Secret for self-issued HS256 tokens. Enables the self-issued verifier.
    #[arg(long, env = "PULSE_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    /// Expected `iss` of self-issued tokens.
    #[arg(long, default_value = "pulse", env = "PULSE_TOKEN_ISSUER")]
    pub token_issuer: String,

    /// Expected `aud` of self-issued tokens.
    #[arg(long, default_value = "pulse-socket", env = "PULSE_TOKEN_AUDIENCE")]
    pub token_audience: String,

    /// Identity provider endpoint for third-party session tokens.
    #[arg(long, env = "PULSE_SESSION_URL")]
    pub session_url: Option<String>,

    /// Identity provider request timeout in milliseconds.
    #[arg(long, default_value_t = 5000, env = "PULSE_SESSION_TIMEOUT_MS")]
    pub session_timeout_ms: u64,

    /// Server heartbeat ping interval in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "PULSE_PING_INTERVAL_MS")]
    pub ping_interval_ms: u64,

    /// Idle eviction sweep interval in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "PULSE_EVICTION_INTERVAL_MS")]
    pub eviction_interval_ms: u64,

    /// Close connections with no inbound frame for this long (milliseconds).
    #[arg(long, default_value_t = 60_000, env = "PULSE_HEARTBEAT_TIMEOUT_MS")]
    pub heartbeat_timeout_ms: u64,

    /// Close an unauthenticated connection this long after a failed login (milliseconds).
    #[arg(long, default_value_t = 5000, env = "PULSE_AUTH_GRACE_MS")]
    pub auth_grace_ms: u64,

    /// Accepted clock skew for credential timestamps (milliseconds).
    #[arg(long, default_value_t = 300_000, env = "PULSE_MAX_SKEW_MS")]
    pub max_skew_ms: u64,

    /// Events allowed per connection per rate-limit window.
    #[arg(long, default_value_t = 100, env = "PULSE_RATE_LIMIT_EVENTS")]
    pub rate_limit_events: u32,

    /// Rate-limit window in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "PULSE_RATE_LIMIT_WINDOW_MS")]
    pub rate_limit_window_ms: u64,

    /// Log format (json or text).
    #[arg(long, default_value = "text", env = "PULSE_LOG_FORMAT")]
    pub log_format: String,

    /// Log level filter.
    #[arg(long, default_value = "info", env = "PULSE_LOG_LEVEL")]
    pub log_level: String,
}

macro_rules! ms_accessor {
    ($method:ident, $field:ident) => {
        pub fn $method(&self) -> Duration {
            Duration::from_millis(self.$field)
        }
    };
}

impl PulseConfig {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.auth_secret.as_deref() {
            None | Some("") => anyhow::bail!("--auth-secret (PULSE_AUTH_SECRET) is required"),
            Some(_) => {}
        }
        if self.token_secret.is_none() && self.session_url.is_none() {
            anyhow::bail!("no identity verifier: set --token-secret and/or --session-url");
        }
        if !self.ws_path.starts_with('/') {
            anyhow::bail!("--ws-path must start with '/': {}", self.ws_path);
        }

        for (flag, ms) in [
            ("--ping-interval-ms", self.ping_interval_ms),
            ("--eviction-interval-ms", self.eviction_interval_ms),
            ("--heartbeat-timeout-ms", self.heartbeat_timeout_ms),
            ("--rate-limit-window-ms", self.rate_limit_window_ms),
        ] {
            if ms == 0 {
                anyhow::bail!("{flag} must be positive");
            }
        }
        if self.heartbeat_timeout_ms <= self.ping_interval_ms {
            anyhow::bail!("--heartbeat-timeout-ms must exceed --ping-interval-ms");
        }
        if self.rate_limit_events == 0 {
            anyhow::bail!("--rate-limit-events must be positive");
        }

        match self.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => anyhow::bail!("invalid --log-format: {other}"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    ms_accessor!(session_timeout, session_timeout_ms);
    ms_accessor!(ping_interval, ping_interval_ms);
    ms_accessor!(eviction_interval, eviction_interval_ms);
    ms_accessor!(heartbeat_timeout, heartbeat_timeout_ms);
    ms_accessor!(auth_grace, auth_grace_ms);
    ms_accessor!(max_skew, max_skew_ms);
    ms_accessor!(rate_limit_window, rate_limit_window_ms);

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            ping_interval: self.ping_interval(),
            eviction_interval: self.eviction_interval(),
            heartbeat_timeout: self.heartbeat_timeout(),
        }
    }

    /// Minimal config for tests: ephemeral port, self-issued tokens only.
    pub fn test() -> Self {
        Self::parse_from([
            "pulse",
            "--port",
            "0",
            "--auth-secret",
            "test-socket-secret",
            "--token-secret",
            "test-token-secret",
        ])
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
