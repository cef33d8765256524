//! Wire-level names shared by the URL builder, redirect parser, token
//! exchanger, and session store.

/// `response_type` sent to the authorization endpoint.
pub const RESPONSE_TYPE_CODE: &str = "code";

/// `grant_type` for exchanging an authorization code.
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// `grant_type` for refreshing an access token.
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Authorization URL parameter carrying the organization name.
pub const ORGANIZATION_PARAM: &str = "domain";

/// Default session file name when the host does not configure one.
pub const DEFAULT_STORE_FILE: &str = "session.json";
