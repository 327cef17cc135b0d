// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol shared by the server and client agent.
//!
//! Every frame is a UTF-8 JSON object `{"t": kind, "evt": name, "data": any}`.
//! `t` selects one of five namespaces and `evt` names an action within it.
//! Frames are immutable once built; there are no partial frames.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorCode;

/// Longest accepted event name, in bytes.
pub const MAX_EVENT_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Top-level frame category (`t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Event,
    Heartbeat,
    Auth,
    Error,
    Ack,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Heartbeat => "heartbeat",
            Self::Auth => "auth",
            Self::Error => "error",
            Self::Ack => "ack",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EventName
// ---------------------------------------------------------------------------

/// A validated event name (`evt`).
///
/// Names are 1..=128 bytes of `[A-Za-z0-9:_.-]`. Anything else is rejected
/// when the frame is decoded, so handler lookup never sees arbitrary input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventName(Cow<'static, str>);

impl EventName {
    /// Build a name from a literal. Only used for the canonical names below.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into();
        validate_event_name(&name)?;
        Ok(Self(Cow::Owned(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when this name starts with `prefix` (e.g. `"game:"`).
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

fn validate_event_name(name: &str) -> Result<(), ProtocolError> {
    if name.is_empty() {
        return Err(ProtocolError::InvalidEventName("empty".to_owned()));
    }
    if name.len() > MAX_EVENT_NAME_LEN {
        return Err(ProtocolError::InvalidEventName(format!(
            "longer than {MAX_EVENT_NAME_LEN} bytes"
        )));
    }
    let valid = name.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b':' | b'_' | b'.' | b'-'));
    if !valid {
        return Err(ProtocolError::InvalidEventName(format!("illegal characters in {name:?}")));
    }
    Ok(())
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for EventName {
    type Error = ProtocolError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl Serialize for EventName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// Canonical event names.
pub mod names {
    use super::EventName;

    pub const CONNECTION_ESTABLISHED: EventName = EventName::from_static("connection:established");
    pub const LOGIN: EventName = EventName::from_static("login");
    pub const SUCCESS: EventName = EventName::from_static("success");
    pub const FAILED: EventName = EventName::from_static("failed");
    pub const PING: EventName = EventName::from_static("ping");
    pub const PONG: EventName = EventName::from_static("pong");
    pub const ERROR: EventName = EventName::from_static("error");
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One discrete wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "t")]
    pub kind: Kind,
    #[serde(rename = "evt")]
    pub event: EventName,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(kind: Kind, event: EventName, data: Value) -> Self {
        Self { kind, event, data }
    }

    /// An application `event` frame.
    pub fn event(event: EventName, data: Value) -> Self {
        Self::new(Kind::Event, event, data)
    }

    /// An application `event` frame with a typed payload.
    pub fn event_typed<T: Serialize>(event: EventName, data: &T) -> Result<Self, ProtocolError> {
        let data = serde_json::to_value(data).map_err(|e| ProtocolError::Payload(e.to_string()))?;
        Ok(Self::event(event, data))
    }

    pub fn established(client_id: impl Into<String>) -> Self {
        let data = Established { client_id: client_id.into() };
        Self::new(Kind::Event, names::CONNECTION_ESTABLISHED, to_value(&data))
    }

    pub fn ping(timestamp: u64) -> Self {
        Self::new(Kind::Heartbeat, names::PING, to_value(&HeartbeatPayload { timestamp }))
    }

    pub fn pong(timestamp: u64) -> Self {
        Self::new(Kind::Heartbeat, names::PONG, to_value(&HeartbeatPayload { timestamp }))
    }

    pub fn login(credential: &AuthCredential) -> Self {
        Self::new(Kind::Auth, names::LOGIN, to_value(credential))
    }

    pub fn auth_success(client_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let data = AuthSuccess { client_id: client_id.into(), user_id: user_id.into() };
        Self::new(Kind::Auth, names::SUCCESS, to_value(&data))
    }

    pub fn auth_failed(code: ErrorCode, message: impl Into<String>) -> Self {
        let data = ErrorPayload { code, message: message.into() };
        Self::new(Kind::Auth, names::FAILED, to_value(&data))
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let data = ErrorPayload { code, message: message.into() };
        Self::new(Kind::Error, names::ERROR, to_value(&data))
    }

    pub fn ack(event: EventName, data: Value) -> Self {
        Self::new(Kind::Ack, event, data)
    }

    /// True when this frame is `kind:event`.
    pub fn is(&self, kind: Kind, event: &EventName) -> bool {
        self.kind == kind && &self.event == event
    }

    /// Compound observer key, e.g. `"auth:success"`.
    pub fn compound_key(&self) -> String {
        format!("{}:{}", self.kind, self.event)
    }

    /// Decode the payload as `T`.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        T::deserialize(&self.data).map_err(|e| ProtocolError::Payload(e.to_string()))
    }

    pub fn encode(&self) -> String {
        // Frame holds only strings, enums, and a `Value`; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a frame from its text encoding.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

fn to_value<T: Serialize>(data: &T) -> Value {
    serde_json::to_value(data).unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// `event:connection:established`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Established {
    pub client_id: String,
}

/// `heartbeat:ping` / `heartbeat:pong`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub timestamp: u64,
}

/// `auth:login` data: proof that the holder of `token` asked for this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCredential {
    pub token: String,
    /// Issue time in epoch milliseconds.
    pub timestamp: u64,
    /// Lowercase hex HMAC-SHA256 of `token:timestamp`.
    pub signature: String,
}

/// `auth:success`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccess {
    pub client_id: String,
    pub user_id: String,
}

/// `error:error` and `auth:failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structural decode failures. Always reported as `INVALID_MESSAGE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Malformed(String),
    InvalidEventName(String),
    Payload(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed frame: {e}"),
            Self::InvalidEventName(e) => write!(f, "invalid event name: {e}"),
            Self::Payload(e) => write!(f, "invalid payload: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Current epoch milliseconds.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
