// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity-provider client for third-party session tokens.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;

use super::identity::{SessionVerifier, VerifyError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    subject_id: String,
}

/// Verifies third-party session tokens against an identity-provider endpoint.
///
/// Sends `GET <url>` with `Authorization: Bearer <token>` and expects
/// `{"subjectId": "..."}` on success.
pub struct HttpSessionVerifier {
    client: reqwest::Client,
    url: String,
}

impl HttpSessionVerifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client, url: url.into() }
    }

    async fn lookup(&self, token: &str) -> Result<String, VerifyError> {
        let resp = self
            .client
            .get(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| VerifyError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_client_error() {
            return Err(VerifyError::Rejected(format!("identity provider returned {status}")));
        }
        if !status.is_success() {
            return Err(VerifyError::Unavailable(format!("identity provider returned {status}")));
        }
        let info: SessionInfo =
            resp.json().await.map_err(|e| VerifyError::Unavailable(e.to_string()))?;
        Ok(info.subject_id)
    }
}

impl SessionVerifier for HttpSessionVerifier {
    fn verify_session<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<String, VerifyError>> {
        self.lookup(token).boxed()
    }
}
