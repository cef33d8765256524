//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (login completion)
//! 2. Token refresh (expired token on read, or unauthorized signal)
//!
//! Both POST a form to the configured token endpoint with different grant
//! types. No retries happen here; the session controller owns retry policy.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CredentialConfig;
use crate::constants::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN};
use crate::error::{Error, Result};

/// Token pair issued by the provider.
///
/// `expires_in` is a delta in seconds from issuance. The session converts it
/// to an absolute unix millisecond timestamp when storing the pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

impl TokenPair {
    /// Both tokens present. A session is only logged in with a full pair.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Raw token endpoint body. `refresh_token` may be absent on refresh when the
/// provider does not rotate it.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
}

/// Error body shape from RFC 6749 §5.2.
#[derive(Deserialize)]
struct ProviderErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Performs code exchange and refresh against the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    client: reqwest::Client,
    config: CredentialConfig,
}

impl TokenExchanger {
    /// The client carries transport settings (timeouts, TLS); the config
    /// carries the credential and endpoint.
    pub fn new(client: reqwest::Client, config: CredentialConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// Exchange an authorization code for a token pair.
    ///
    /// A response without a refresh token is a `Decoding` error: a session
    /// that cannot be refreshed is not a usable login.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        let form = [
            ("grant_type", GRANT_AUTHORIZATION_CODE),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        let response = self.post(GRANT_AUTHORIZATION_CODE, &form).await?;
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Decoding("code exchange returned no refresh_token".into()))?;

        Ok(TokenPair {
            access_token: response.access_token,
            refresh_token,
            expires_in: response.expires_in,
        })
    }

    /// Refresh an access token.
    ///
    /// The access token is always replaced. If the provider does not rotate
    /// the refresh token, the one presented here is carried forward.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let form = [
            ("grant_type", GRANT_REFRESH_TOKEN),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_str()),
        ];
        let response = self.post(GRANT_REFRESH_TOKEN, &form).await?;

        Ok(TokenPair {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| refresh_token.to_owned()),
            expires_in: response.expires_in,
        })
    }

    /// POST a grant to the token endpoint and decode the body.
    ///
    /// Emits one diagnostics event per call with method, url, grant, status,
    /// and elapsed time. Form values are never logged.
    async fn post(&self, grant: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let url = self.config.token_url.as_str();
        let started = Instant::now();

        let response = match self.client.post(url).form(form).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    method = "POST",
                    url,
                    grant,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "token endpoint unreachable"
                );
                return Err(Error::Network(format!("{grant} request failed: {e}")));
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("reading {grant} response: {e}")))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            let message = provider_message(status, &body);
            warn!(
                method = "POST",
                url,
                grant,
                status = status.as_u16(),
                elapsed_ms,
                error = %message,
                "token endpoint rejected request"
            );
            return Err(Error::Provider(message));
        }

        debug!(
            method = "POST",
            url,
            grant,
            status = status.as_u16(),
            elapsed_ms,
            "token endpoint call succeeded"
        );

        serde_json::from_str::<TokenResponse>(&body)
            .map_err(|e| Error::Decoding(format!("invalid {grant} response: {e}")))
    }
}

/// Build a provider error message, preferring the RFC 6749 error body.
fn provider_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ProviderErrorBody>(body) {
        Ok(ProviderErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description} ({status})"),
        Ok(ProviderErrorBody { error, .. }) => format!("{error} ({status})"),
        Err(_) if body.trim().is_empty() => format!("token endpoint returned {status}"),
        Err(_) => format!("token endpoint returned {status}: {}", body.trim()),
    }
}
