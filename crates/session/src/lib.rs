//! OAuth2 session lifecycle
//!
//! `SessionController` owns the single session of a host application: it
//! drives login through an `AuthorizationPresenter`, consumes the redirect,
//! hands out access tokens (refreshing them inline when expired), and reacts
//! to `UnauthorizedSignal` reports from API call sites.
//!
//! Composition:
//! ```text
//! CredentialConfig ─▶ TokenExchanger ─┐
//! TokenStore::open(path, hash) ───────┼─▶ SessionController::new(..) ◀── UnauthorizedListener
//! AuthorizationPresenter ─────────────┘                                     ▲
//!                                                     API clients ── UnauthorizedSignal::publish()
//! ```

pub mod controller;
pub mod metrics;
pub mod policy;
pub mod presenter;
pub mod signal;

pub use controller::{LoginComplete, LoginFailed, SessionController, SessionPhase};
pub use policy::{RefreshFailureAction, RefreshPolicy};
pub use presenter::{AuthorizationPresenter, NoopPresenter};
pub use signal::{UnauthorizedListener, UnauthorizedSignal, unauthorized_channel};
