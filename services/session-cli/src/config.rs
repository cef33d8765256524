//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from SESSION_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use session::RefreshPolicy;
use session_auth::{CredentialConfig, DEFAULT_STORE_FILE};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Env var holding the OAuth client secret
pub const CLIENT_SECRET_ENV: &str = "SESSION_CLIENT_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub credential: CredentialSection,
    pub provider: ProviderSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// OAuth client registration
#[derive(Debug, Deserialize)]
pub struct CredentialSection {
    pub client_id: String,
    #[serde(default)]
    pub scope: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub organization: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to SESSION_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    /// Overrides the fingerprint derived from the credential fields
    #[serde(default)]
    pub credential_hash: Option<String>,
}

/// Provider endpoints
#[derive(Debug, Deserialize)]
pub struct ProviderSection {
    pub authorize_url: String,
    pub token_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session persistence and refresh behavior
#[derive(Debug, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub logout_on_network_error: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            logout_on_network_error: false,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_FILE)
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. SESSION_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.credential.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }
        if config.credential.redirect_uri.trim().is_empty() {
            return Err(common::Error::Config(
                "redirect_uri must not be empty".into(),
            ));
        }
        if config.provider.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        parse_endpoint("authorize_url", &config.provider.authorize_url)?;
        parse_endpoint("token_url", &config.provider.token_url)?;

        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            config.credential.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.credential.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            config.credential.client_secret = Some(Secret::new(secret.trim().to_owned()));
        }

        match &config.credential.client_secret {
            Some(secret) if !secret.is_blank() => {}
            _ => {
                return Err(common::Error::Config(format!(
                    "client secret missing: set {CLIENT_SECRET_ENV} or client_secret_file"
                )));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("oauth-session.toml")
    }

    /// Immutable credential handed to the token exchanger.
    pub fn credential_config(&self) -> common::Result<CredentialConfig> {
        let client_secret = self
            .credential
            .client_secret
            .clone()
            .ok_or_else(|| common::Error::Config("client secret not loaded".into()))?;

        Ok(CredentialConfig {
            client_id: self.credential.client_id.trim().to_owned(),
            client_secret,
            scope: self.credential.scope.clone(),
            redirect_uri: self.credential.redirect_uri.trim().to_owned(),
            organization: self.credential.organization.trim().to_owned(),
            authorize_url: parse_endpoint("authorize_url", &self.provider.authorize_url)?,
            token_url: parse_endpoint("token_url", &self.provider.token_url)?,
        })
    }

    /// Configured credential hash, or the fingerprint of `credential`.
    pub fn credential_hash(&self, credential: &CredentialConfig) -> String {
        match self.credential.credential_hash.as_deref().map(str::trim) {
            Some(hash) if !hash.is_empty() => hash.to_owned(),
            _ => credential.fingerprint(),
        }
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            logout_on_network_error: self.session.logout_on_network_error,
        }
    }

    /// Token endpoint request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs)
    }
}

/// Parse an endpoint URL and require an http(s) scheme.
fn parse_endpoint(field: &'static str, raw: &str) -> common::Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| common::Error::url(field, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(common::Error::Config(format!(
            "{field} must use http:// or https://, got scheme {other}"
        ))),
    }
}
