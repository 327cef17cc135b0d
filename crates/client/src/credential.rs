// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use pulse::auth::Signer;
use pulse::protocol::AuthCredential;

/// Produces a fresh `auth:login` credential for each new connection.
pub trait CredentialSource: Send + Sync + 'static {
    fn credential(&self, now_ms: u64) -> AuthCredential;
}

/// A bearer token signed with the shared socket secret.
#[derive(Debug, Clone)]
pub struct SignedToken {
    signer: Signer,
    token: String,
}

impl SignedToken {
    pub fn new(secret: &[u8], token: impl Into<String>) -> Self {
        Self { signer: Signer::new(secret), token: token.into() }
    }
}

impl CredentialSource for SignedToken {
    fn credential(&self, now_ms: u64) -> AuthCredential {
        self.signer.credential(self.token.clone(), now_ms)
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
