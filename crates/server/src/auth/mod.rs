// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket auth challenge.
//!
//! A client proves it holds a bearer token by sending `auth:login` with
//! `{token, timestamp, signature}` where `signature` is an HMAC-SHA256 of
//! `token:timestamp` under the server secret. The server checks the
//! signature in constant time, rejects timestamps outside the skew window,
//! then resolves the token to a stable identity through an external
//! verifier.

pub mod identity;
#[cfg(feature = "server")]
pub mod session;
pub mod token;

use std::fmt;
use std::time::Duration;

use ring::hmac;

pub use self::identity::{Identity, IdentityResolver, SelfIssuedVerifier, SessionVerifier, VerifyError};
#[cfg(feature = "server")]
pub use self::session::HttpSessionVerifier;
pub use self::token::{HmacTokenVerifier, SelfIssuedClaims, TokenKind};

use crate::error::ErrorCode;
use crate::protocol::AuthCredential;

/// Default accepted distance between client and server clocks.
pub const DEFAULT_MAX_SKEW: Duration = Duration::from_secs(5 * 60);

/// Signs and verifies socket auth credentials.
#[derive(Clone)]
pub struct Signer {
    key: hmac::Key,
    max_skew: Duration,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("max_skew", &self.max_skew).finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(secret: &[u8]) -> Self {
        Self { key: hmac::Key::new(hmac::HMAC_SHA256, secret), max_skew: DEFAULT_MAX_SKEW }
    }

    pub fn with_max_skew(mut self, max_skew: Duration) -> Self {
        self.max_skew = max_skew;
        self
    }

    pub fn max_skew(&self) -> Duration {
        self.max_skew
    }

    /// Hex HMAC-SHA256 of `token:issued_at_ms`.
    pub fn sign(&self, token: &str, issued_at_ms: u64) -> String {
        let tag = hmac::sign(&self.key, signing_input(token, issued_at_ms).as_bytes());
        hex::encode(tag.as_ref())
    }

    /// Build a complete credential stamped at `now_ms`.
    pub fn credential(&self, token: impl Into<String>, now_ms: u64) -> AuthCredential {
        let token = token.into();
        let signature = self.sign(&token, now_ms);
        AuthCredential { token, timestamp: now_ms, signature }
    }

    /// Verify a credential against the server clock.
    ///
    /// The skew check runs first: an expired credential fails even when its
    /// signature is correct.
    pub fn verify(&self, credential: &AuthCredential, now_ms: u64) -> Result<(), CredentialError> {
        let skew_ms = now_ms.abs_diff(credential.timestamp);
        if u128::from(skew_ms) > self.max_skew.as_millis() {
            return Err(CredentialError::Expired { skew_ms });
        }

        let signature =
            hex::decode(&credential.signature).map_err(|_| CredentialError::MalformedSignature)?;
        let input = signing_input(&credential.token, credential.timestamp);
        hmac::verify(&self.key, input.as_bytes(), &signature)
            .map_err(|_| CredentialError::BadSignature)
    }
}

fn signing_input(token: &str, issued_at_ms: u64) -> String {
    format!("{token}:{issued_at_ms}")
}

/// Why a credential failed the signature/window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    Expired { skew_ms: u64 },
    MalformedSignature,
    BadSignature,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired { skew_ms } => write!(f, "credential timestamp off by {skew_ms}ms"),
            Self::MalformedSignature => f.write_str("signature is not hex"),
            Self::BadSignature => f.write_str("signature mismatch"),
        }
    }
}

impl std::error::Error for CredentialError {}

/// Any reason an `auth:login` did not authenticate the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// The `data` of the login frame is not a credential.
    Malformed(String),
    Credential(CredentialError),
    /// The identity provider rejected the token.
    Rejected(String),
    /// The identity provider could not be consulted.
    Provider(String),
    AlreadyAuthenticated,
}

impl AuthFailure {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Provider(_) => ErrorCode::AuthError,
            _ => ErrorCode::AuthFailed,
        }
    }

    /// Client-facing message. Provider details stay in the server log.
    pub fn message(&self) -> String {
        match self {
            Self::Malformed(_) => "Invalid auth payload".to_owned(),
            Self::Credential(CredentialError::Expired { .. }) => "Credential expired".to_owned(),
            Self::Credential(_) => "Invalid signature".to_owned(),
            Self::Rejected(_) => "Invalid token".to_owned(),
            Self::Provider(_) => "Authentication service unavailable".to_owned(),
            Self::AlreadyAuthenticated => "Connection already authenticated".to_owned(),
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed credential: {e}"),
            Self::Credential(e) => write!(f, "{e}"),
            Self::Rejected(e) => write!(f, "token rejected: {e}"),
            Self::Provider(e) => write!(f, "identity provider error: {e}"),
            Self::AlreadyAuthenticated => f.write_str("already authenticated"),
        }
    }
}

impl std::error::Error for AuthFailure {}

impl From<CredentialError> for AuthFailure {
    fn from(e: CredentialError) -> Self {
        Self::Credential(e)
    }
}

/// Credential check plus identity resolution.
pub struct Authenticator {
    signer: Signer,
    resolver: IdentityResolver,
}

impl Authenticator {
    pub fn new(signer: Signer, resolver: IdentityResolver) -> Self {
        Self { signer, resolver }
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Verify `credential` at `now_ms` and resolve its token to an identity.
    ///
    /// The provider lookup is the only suspension point; it stalls only the
    /// connection that sent the login.
    pub async fn authenticate(
        &self,
        credential: &AuthCredential,
        now_ms: u64,
    ) -> Result<Identity, AuthFailure> {
        self.signer.verify(credential, now_ms)?;
        self.resolver.resolve(&credential.token).await
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
