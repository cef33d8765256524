//! Client credential configuration
//!
//! A `CredentialConfig` is built once by the host and never mutated. Its
//! fingerprint binds a persisted session to the credential that created it,
//! so rotating the client secret or switching organizations discards the old
//! session on the next start.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::Secret;
use sha2::{Digest, Sha256};
use url::Url;

/// Immutable OAuth client configuration.
#[derive(Debug, Clone)]
pub struct CredentialConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Space-separated scope list, sent verbatim
    pub scope: String,
    pub redirect_uri: String,
    /// Organization (workspace) name; empty for none
    pub organization: String,
    pub authorize_url: Url,
    pub token_url: Url,
}

impl CredentialConfig {
    /// Derive a credential hash from the fields that identify the credential.
    ///
    /// `base64url(SHA-256(client_id 0x00 client_secret 0x00 organization))`.
    /// Used when the host does not supply its own credential hash.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.client_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.client_secret.expose_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.organization.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// The organization name, if one is configured.
    pub fn organization(&self) -> Option<&str> {
        let org = self.organization.trim();
        (!org.is_empty()).then_some(org)
    }
}

#[cfg(test)]
pub(crate) fn test_config(base: &str) -> CredentialConfig {
    CredentialConfig {
        client_id: "client-123".into(),
        client_secret: Secret::from("cs_test"),
        scope: "project tm".into(),
        redirect_uri: "myapp://oauth/callback".into(),
        organization: "acme".into(),
        authorize_url: Url::parse(&format!("{base}/oauth/authorize")).unwrap(),
        token_url: Url::parse(&format!("{base}/oauth/token")).unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let config = test_config("https://accounts.test");
        assert_eq!(config.fingerprint(), config.clone().fingerprint());
        // SHA-256 → 32 bytes → 43 base64url chars
        assert_eq!(config.fingerprint().len(), 43);
    }

    #[test]
    fn fingerprint_changes_with_rotated_secret() {
        let config = test_config("https://accounts.test");
        let mut rotated = config.clone();
        rotated.client_secret = Secret::from("cs_rotated");
        assert_ne!(config.fingerprint(), rotated.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_organization() {
        let config = test_config("https://accounts.test");
        let mut other = config.clone();
        other.organization = "other-org".into();
        assert_ne!(config.fingerprint(), other.fingerprint());
    }

    #[test]
    fn fingerprint_separates_fields() {
        // "ab" + "" must not collide with "a" + "b"
        let mut a = test_config("https://accounts.test");
        a.client_id = "ab".into();
        a.client_secret = Secret::from("");
        let mut b = a.clone();
        b.client_id = "a".into();
        b.client_secret = Secret::from("b");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn blank_organization_is_none() {
        let mut config = test_config("https://accounts.test");
        assert_eq!(config.organization(), Some("acme"));
        config.organization = "  ".into();
        assert_eq!(config.organization(), None);
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let config = test_config("https://accounts.test");
        let debug = format!("{config:?}");
        assert!(!debug.contains("cs_test"), "leaked: {debug}");
    }
}
