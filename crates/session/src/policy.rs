//! Refresh failure classification
//!
//! Decides whether a failed refresh ends the session. Provider rejections
//! always do: the refresh token is dead. Transport failures only do when the
//! host opts in, so a brief network blip does not force the user through the
//! login page again.

use session_auth::Error;

/// What the controller does with the session after a failed refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshFailureAction {
    /// Clear the session; the user must log in again
    Logout,
    /// Keep the stored tokens; the next read retries the refresh
    KeepSession,
}

/// Host-tunable refresh failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshPolicy {
    /// Treat a `Network` error during refresh like a provider rejection
    pub logout_on_network_error: bool,
}

impl RefreshPolicy {
    /// Classify a refresh error.
    ///
    /// - `Provider` → Logout
    /// - `Network` → Logout only with `logout_on_network_error`
    /// - `Decoding`, `Storage` → KeepSession (surfaced, no state mutation)
    /// - `Configuration`, `UserCancelled` → Logout (cannot refresh with this credential)
    pub fn classify(&self, error: &Error) -> RefreshFailureAction {
        match error {
            Error::Provider(_) => RefreshFailureAction::Logout,
            Error::Network(_) if self.logout_on_network_error => RefreshFailureAction::Logout,
            Error::Network(_) => RefreshFailureAction::KeepSession,
            Error::Decoding(_) | Error::Storage(_) => RefreshFailureAction::KeepSession,
            Error::Configuration(_) | Error::UserCancelled => RefreshFailureAction::Logout,
        }
    }
}
