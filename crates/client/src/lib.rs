// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client side of the pulse socket protocol: a reconnecting agent with
//! signed logins, heartbeats, and per-event observers.

pub mod agent;
pub mod backoff;
pub mod credential;
pub mod observers;

pub use agent::{Agent, AgentConfig, AgentError, AgentState, Connector, Link, WsConnector};
pub use backoff::ReconnectPolicy;
pub use credential::{CredentialSource, SignedToken};
pub use observers::{ObserverId, Observers};
