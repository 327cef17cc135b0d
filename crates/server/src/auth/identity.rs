// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token → identity resolution.
//!
//! Both verifiers are external collaborators. The resolver only picks one
//! based on the token's structure and maps its answer to an [`Identity`].

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::debug;

use super::token::{SelfIssuedClaims, TokenKind};
use super::AuthFailure;

/// Stable subject id a connection is bound to after auth.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verifier outcome other than success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    Malformed(String),
    BadSignature,
    Expired,
    Rejected(String),
    /// The verifier itself failed (network, 5xx, bad response body).
    Unavailable(String),
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed token: {e}"),
            Self::BadSignature => f.write_str("bad token signature"),
            Self::Expired => f.write_str("token expired"),
            Self::Rejected(e) => write!(f, "rejected: {e}"),
            Self::Unavailable(e) => write!(f, "verifier unavailable: {e}"),
        }
    }
}

impl std::error::Error for VerifyError {}

impl From<VerifyError> for AuthFailure {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Unavailable(msg) => AuthFailure::Provider(msg),
            other => AuthFailure::Rejected(other.to_string()),
        }
    }
}

/// Local signature/expiry check for self-issued tokens.
pub trait SelfIssuedVerifier: Send + Sync {
    fn verify_self_issued(&self, token: &str) -> Result<SelfIssuedClaims, VerifyError>;
}

/// Third-party session verification. Returns the subject id.
pub trait SessionVerifier: Send + Sync {
    fn verify_session<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<String, VerifyError>>;
}

/// Picks a verifier by token structure and returns the subject.
#[derive(Default, Clone)]
pub struct IdentityResolver {
    self_issued: Option<Arc<dyn SelfIssuedVerifier>>,
    external: Option<Arc<dyn SessionVerifier>>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_self_issued(mut self, verifier: Arc<dyn SelfIssuedVerifier>) -> Self {
        self.self_issued = Some(verifier);
        self
    }

    pub fn with_external(mut self, verifier: Arc<dyn SessionVerifier>) -> Self {
        self.external = Some(verifier);
        self
    }

    /// Resolve `token` to an identity, or say why not.
    pub async fn resolve(&self, token: &str) -> Result<Identity, AuthFailure> {
        if token.is_empty() {
            return Err(AuthFailure::Rejected("empty token".to_owned()));
        }
        let kind = TokenKind::classify(token);
        debug!(?kind, "resolving socket token");
        let subject = match kind {
            TokenKind::SelfIssued => {
                let verifier = self.self_issued.as_ref().ok_or_else(|| {
                    AuthFailure::Rejected("self-issued tokens not accepted".to_owned())
                })?;
                verifier.verify_self_issued(token)?.sub
            }
            TokenKind::ExternalSession => {
                let verifier = self.external.as_ref().ok_or_else(|| {
                    AuthFailure::Rejected("session tokens not accepted".to_owned())
                })?;
                verifier.verify_session(token).await?
            }
        };
        if subject.is_empty() {
            return Err(AuthFailure::Rejected("empty subject".to_owned()));
        }
        Ok(Identity::new(subject))
    }

    /// Like [`resolve`](Self::resolve) but collapses every failure to `None`.
    pub async fn resolve_identity(&self, token: &str) -> Option<Identity> {
        self.resolve(token).await.ok()
    }
}
