//! Authorization endpoint URL construction
//!
//! Pure function of the credential configuration: the same config always
//! yields the same URL, so the URL can be rebuilt on every `login`.

use url::Url;

use crate::config::CredentialConfig;
use crate::constants::{ORGANIZATION_PARAM, RESPONSE_TYPE_CODE};
use crate::error::{Error, Result};

/// Build the authorization URL with all required OAuth parameters.
///
/// Appends `client_id`, `redirect_uri`, `response_type=code`, `scope`, and
/// the organization (when configured) to the configured authorize endpoint.
/// Any query already present on the endpoint is preserved.
pub fn build_authorization_url(config: &CredentialConfig) -> Result<Url> {
    if config.client_id.trim().is_empty() {
        return Err(Error::Configuration("client_id is empty".into()));
    }
    if config.redirect_uri.trim().is_empty() {
        return Err(Error::Configuration("redirect_uri is empty".into()));
    }
    // The redirect URI must be absolute so redirects can be matched against it
    Url::parse(&config.redirect_uri).map_err(|e| {
        Error::Configuration(format!("redirect_uri {:?} is not a URL: {e}", config.redirect_uri))
    })?;

    let mut url = config.authorize_url.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("response_type", RESPONSE_TYPE_CODE)
            .append_pair("scope", &config.scope);
        if let Some(org) = config.organization() {
            query.append_pair(ORGANIZATION_PARAM, org);
        }
    }
    Ok(url)
}
