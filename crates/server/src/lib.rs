// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pulse: real-time socket messaging server.
//!
//! Everything that needs the HTTP stack sits behind the default `server`
//! feature. Clients depend on this crate with `default-features = false` to
//! get the wire protocol and credential signing alone.

#[cfg(feature = "server")]
pub mod app;
pub mod auth;
#[cfg(feature = "server")]
pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod registry;
#[cfg(feature = "server")]
pub mod state;
#[cfg(feature = "server")]
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(feature = "server")]
mod server;

#[cfg(feature = "server")]
pub use server::{
    build_authenticator, default_pipeline, init_tracing, install_crypto_provider, run, spawn,
    RunningServer,
};
