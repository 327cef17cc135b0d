// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes carried in the `data.code` field of `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidMessage,
    Unauthorized,
    AuthFailed,
    AuthError,
    RateLimit,
    HandlerError,
    ConnectionError,
    RuntimeError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::AuthError => "AUTH_ERROR",
            Self::RateLimit => "RATE_LIMIT",
            Self::HandlerError => "HANDLER_ERROR",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::RuntimeError => "RUNTIME_ERROR",
        }
    }

    /// Whether a client should treat this code as ending the session.
    ///
    /// Only auth rejections are terminal, and only once the grace period
    /// lapses; the server closes the socket itself in that case.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::AuthFailed | Self::AuthError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a handler or middleware stage.
///
/// Converted into an `error` frame for the originating connection only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub code: ErrorCode,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidMessage, message)
    }

    /// Generic handler failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::HandlerError, message)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::invalid(format!("invalid payload: {e}"))
    }
}

impl From<crate::protocol::ProtocolError> for HandlerError {
    fn from(e: crate::protocol::ProtocolError) -> Self {
        Self::invalid(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
