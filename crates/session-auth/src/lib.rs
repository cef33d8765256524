//! OAuth2 authorization-code building blocks
//!
//! Leaf components of the session manager: authorization URL construction,
//! redirect parsing, code exchange and refresh, and session persistence.
//! This crate has no state machine of its own; `session::SessionController`
//! composes these pieces.
//!
//! Flow:
//! 1. `build_authorization_url()` from a `CredentialConfig`
//! 2. The user authorizes; the host receives the redirect URL
//! 3. `RedirectHandler::handle()` parses it and calls `TokenExchanger::exchange_code()`
//! 4. The pair is stamped (`StoredToken::issued_now`) and written via `TokenStore::write()`
//! 5. On expiry, `TokenExchanger::refresh()` issues a new pair

pub mod authorize;
pub mod config;
pub mod constants;
pub mod error;
pub mod redirect;
pub mod store;
pub mod token;

pub use authorize::build_authorization_url;
pub use config::CredentialConfig;
pub use constants::*;
pub use error::{Error, Result};
pub use redirect::{RedirectHandler, RedirectOutcome};
pub use store::{SessionState, StoredToken, TokenStore, now_millis};
pub use token::{TokenExchanger, TokenPair};
