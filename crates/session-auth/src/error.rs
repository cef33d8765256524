//! Error types for the authorization-code flow

/// Errors from building, exchanging, refreshing, and persisting a session.
///
/// The session controller inspects the variant to decide whether a failed
/// refresh ends the session; see `session::RefreshPolicy`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid client configuration. Fatal to `login`.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Transport-level failure talking to the token endpoint.
    #[error("token endpoint request failed: {0}")]
    Network(String),

    /// The provider rejected the code or refresh token.
    #[error("provider rejected request: {0}")]
    Provider(String),

    /// The token endpoint answered 2xx with a body we could not use.
    #[error("malformed token response: {0}")]
    Decoding(String),

    /// The user dismissed the authorization page.
    #[error("authorization cancelled by user")]
    UserCancelled,

    #[error("session storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Short label for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Network(_) => "network",
            Error::Provider(_) => "provider",
            Error::Decoding(_) => "decoding",
            Error::UserCancelled => "user_cancelled",
            Error::Storage(_) => "storage",
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(Error::Configuration("x".into()).kind(), "configuration");
        assert_eq!(Error::Network("x".into()).kind(), "network");
        assert_eq!(Error::Provider("x".into()).kind(), "provider");
        assert_eq!(Error::Decoding("x".into()).kind(), "decoding");
        assert_eq!(Error::UserCancelled.kind(), "user_cancelled");
        assert_eq!(Error::Storage("x".into()).kind(), "storage");
    }

    #[test]
    fn display_carries_detail() {
        let err = Error::Provider("invalid_grant: code expired (400 Bad Request)".into());
        assert_eq!(
            err.to_string(),
            "provider rejected request: invalid_grant: code expired (400 Bad Request)"
        );
    }
}
