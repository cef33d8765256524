//! Service-specific error types

use thiserror::Error;

/// Command-level failures of the session CLI.
///
/// Configuration problems surface as `common::Error` and session failures as
/// `session_auth::Error`; these cover what only the CLI can get wrong.
#[derive(Error, Debug)]
pub enum Error {
    #[error("redirect_uri {0} cannot be served locally: use http://127.0.0.1:<port>/<path>")]
    RedirectNotLoopback(String),

    #[error("failed to bind callback listener on {addr}: {reason}")]
    CallbackBind { addr: String, reason: String },

    #[error("login failed: {0}")]
    Login(#[from] session_auth::Error),

    #[error("login abandoned before the redirect arrived")]
    LoginAbandoned,

    #[error("not logged in: run the login command first")]
    NotLoggedIn,
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages_are_descriptive() {
        assert!(
            Error::RedirectNotLoopback("myapp://cb".into())
                .to_string()
                .contains("myapp://cb")
        );
        assert_eq!(
            Error::CallbackBind {
                addr: "127.0.0.1:8765".into(),
                reason: "address in use".into(),
            }
            .to_string(),
            "failed to bind callback listener on 127.0.0.1:8765: address in use"
        );
        assert_eq!(
            Error::Login(session_auth::Error::UserCancelled).to_string(),
            "login failed: authorization cancelled by user"
        );
    }

    #[test]
    fn error_debug_includes_variant_name() {
        let err = Error::NotLoggedIn;
        let debug = format!("{err:?}");
        assert!(
            debug.contains("NotLoggedIn"),
            "Debug output must include variant name, got: {debug}"
        );
    }
}
