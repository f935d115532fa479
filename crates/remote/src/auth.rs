// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! OAuth2 access tokens minted from a long-lived refresh token.

use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use reqwest::{Client, Url};
use serde::Deserialize;
use snafu::ResultExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{DecodeSnafu, NetworkSnafu, Result, TokenRefreshSnafu};

/// Tokens are refreshed this long before Google says they expire.
const EXPIRY_SKEW: SignedDuration = SignedDuration::from_secs(60);

#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id:     String,
    pub client_secret: String,
    pub refresh_token: String,
    pub redirect_uri:  Option<String>,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    value:      String,
    expires_at: Timestamp,
}

impl AccessToken {
    fn is_fresh(&self, now: Timestamp) -> bool {
        now.checked_add(EXPIRY_SKEW)
            .is_ok_and(|deadline| deadline < self.expires_at)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in:   u64,
}

const fn default_expires_in() -> u64 { 3600 }

#[derive(Deserialize)]
struct TokenErrorResponse {
    error:             String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Hands out a valid bearer token, refreshing it when it is close to expiry.
///
/// Concurrent callers share one refresh: the cache lock is held across the
/// token request.
#[derive(Debug)]
pub struct TokenSource {
    client:      Client,
    token_url:   Url,
    credentials: OAuthCredentials,
    cached:      Mutex<Option<AccessToken>>,
}

impl TokenSource {
    pub fn new(client: Client, token_url: Url, credentials: OAuthCredentials) -> Self {
        Self {
            client,
            token_url,
            credentials,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Timestamp::now())) {
            return Ok(token.value.clone());
        }

        let token = self.refresh().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drops the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        debug!("invalidating cached access token");
        *self.cached.lock().await = None;
    }

    async fn refresh(&self) -> Result<AccessToken> {
        let endpoint = self.token_url.as_str();
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
        ];
        if let Some(redirect_uri) = &self.credentials.redirect_uri {
            form.push(("redirect_uri", redirect_uri.as_str()));
        }

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await
            .context(NetworkSnafu { endpoint })?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<TokenErrorResponse>().await {
                Ok(body) => match body.error_description {
                    Some(description) => format!("{}: {description}", body.error),
                    None => body.error,
                },
                Err(_) => format!("HTTP {}", status.as_u16()),
            };
            return TokenRefreshSnafu { message }.fail();
        }

        let body: TokenResponse = response.json().await.context(DecodeSnafu { endpoint })?;
        let lifetime = SignedDuration::try_from(Duration::from_secs(body.expires_in))
            .unwrap_or(SignedDuration::from_secs(3600));
        let expires_at = Timestamp::now()
            .checked_add(lifetime)
            .unwrap_or(Timestamp::MAX);
        info!(expires_in = body.expires_in, "refreshed access token");

        Ok(AccessToken {
            value: body.access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_expiring_in(secs: i64) -> AccessToken {
        AccessToken {
            value:      "t".into(),
            expires_at: Timestamp::now()
                .checked_add(SignedDuration::from_secs(secs))
                .unwrap(),
        }
    }

    #[test]
    fn token_inside_skew_is_stale() {
        assert!(token_expiring_in(3600).is_fresh(Timestamp::now()));
        assert!(!token_expiring_in(30).is_fresh(Timestamp::now()));
        assert!(!token_expiring_in(-5).is_fresh(Timestamp::now()));
    }

    #[test]
    fn debug_hides_secrets() {
        let creds = OAuthCredentials {
            client_id:     "id".into(),
            client_secret: "s3cret".into(),
            refresh_token: "r3fresh".into(),
            redirect_uri:  None,
        };
        let shown = format!("{creds:?}");
        assert!(!shown.contains("s3cret"));
        assert!(!shown.contains("r3fresh"));
    }
}
