//! Authorization page presentation
//!
//! The controller never knows how the authorization URL reaches the user.
//! Hosts pick an implementation at composition time: a browser launcher, an
//! embedded web view, or a console prompt.

use url::Url;

/// Shows and hides the authorization page.
///
/// `dismiss` may be called when nothing is presented and must be idempotent.
/// A user-initiated close is reported back through
/// `SessionController::cancel_authorization`.
pub trait AuthorizationPresenter: Send + Sync {
    fn present(&self, url: &Url);

    fn dismiss(&self);
}

/// Presenter for hosts that surface the URL some other way (for example a
/// login command that already printed it). Does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresenter;

impl AuthorizationPresenter for NoopPresenter {
    fn present(&self, _url: &Url) {}

    fn dismiss(&self) {}
}
