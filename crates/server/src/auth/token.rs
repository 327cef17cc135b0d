// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Self-issued bearer tokens.
//!
//! Compact `header.claims.signature` form, each segment base64url without
//! padding, signed with HS256. Issuer and audience are fixed per server.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;
use serde::{Deserialize, Serialize};

use super::identity::{SelfIssuedVerifier, VerifyError};

const ALG: &str = "HS256";

/// Which verifier a bearer token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Three base64url segments whose header names an `alg`.
    SelfIssued,
    /// Anything else: an opaque third-party session id.
    ExternalSession,
}

impl TokenKind {
    pub fn classify(token: &str) -> Self {
        let mut parts = token.split('.');
        let (Some(header), Some(_), Some(_), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Self::ExternalSession;
        };
        match decode_segment::<Header>(header) {
            Some(h) if !h.alg.is_empty() => Self::SelfIssued,
            _ => Self::ExternalSession,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Claims carried by a self-issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfIssuedClaims {
    pub sub: String,
    #[serde(default)]
    pub scope: String,
    pub iss: String,
    pub aud: String,
    pub iat: u64,
    /// Expiry, epoch seconds.
    pub exp: u64,
}

/// HS256 verifier (and issuer) for self-issued tokens.
pub struct HmacTokenVerifier {
    key: hmac::Key,
    issuer: String,
    audience: String,
}

impl fmt::Debug for HmacTokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacTokenVerifier")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl HmacTokenVerifier {
    pub fn new(secret: &[u8], issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Issue a token for `subject` valid for `ttl_secs` from `now_secs`.
    pub fn issue(&self, subject: &str, scope: &str, now_secs: u64, ttl_secs: u64) -> String {
        let header = Header { alg: ALG.to_owned(), typ: Some("JWT".to_owned()) };
        let claims = SelfIssuedClaims {
            sub: subject.to_owned(),
            scope: scope.to_owned(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now_secs,
            exp: now_secs.saturating_add(ttl_secs),
        };
        let signing_input = format!("{}.{}", encode_segment(&header), encode_segment(&claims));
        let tag = hmac::sign(&self.key, signing_input.as_bytes());
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref()))
    }

    /// Verify `token` against the clock `now_secs`.
    pub fn verify_at(&self, token: &str, now_secs: u64) -> Result<SelfIssuedClaims, VerifyError> {
        let mut parts = token.rsplitn(2, '.');
        let (Some(signature), Some(signing_input)) = (parts.next(), parts.next()) else {
            return Err(VerifyError::Malformed("missing signature segment".to_owned()));
        };
        let Some((header, claims)) = signing_input.split_once('.') else {
            return Err(VerifyError::Malformed("missing claims segment".to_owned()));
        };

        let header: Header = decode_segment(header)
            .ok_or_else(|| VerifyError::Malformed("unreadable header".to_owned()))?;
        if header.alg != ALG {
            return Err(VerifyError::Malformed(format!("unsupported alg {}", header.alg)));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| VerifyError::Malformed("signature is not base64url".to_owned()))?;
        hmac::verify(&self.key, signing_input.as_bytes(), &signature)
            .map_err(|_| VerifyError::BadSignature)?;

        let claims: SelfIssuedClaims = decode_segment(claims)
            .ok_or_else(|| VerifyError::Malformed("unreadable claims".to_owned()))?;
        if claims.iss != self.issuer {
            return Err(VerifyError::Rejected(format!("unexpected issuer {}", claims.iss)));
        }
        if claims.aud != self.audience {
            return Err(VerifyError::Rejected(format!("unexpected audience {}", claims.aud)));
        }
        if claims.exp <= now_secs {
            return Err(VerifyError::Expired);
        }
        if claims.sub.is_empty() {
            return Err(VerifyError::Rejected("empty subject".to_owned()));
        }
        Ok(claims)
    }
}

impl SelfIssuedVerifier for HmacTokenVerifier {
    fn verify_self_issued(&self, token: &str) -> Result<SelfIssuedClaims, VerifyError> {
        self.verify_at(token, crate::protocol::epoch_ms() / 1000)
    }
}

fn encode_segment<T: Serialize>(value: &T) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap_or_default())
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
