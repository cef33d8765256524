//! Session state machine
//!
//! The controller is the only component that mutates the session. Every
//! transition runs under one tokio Mutex, so refreshes triggered by an
//! expired read and by the unauthorized signal never overlap: a caller that
//! arrives while a refresh is in flight waits for it and then sees its result.
//!
//! Transitions:
//! - LoggedOut → Authorizing (`login`: URL built and presented)
//! - Authorizing → LoggedIn (redirect consumed, code exchanged, pair stored)
//! - Authorizing → LoggedOut (redirect carried an error, exchange failed, user cancelled)
//! - LoggedIn → Refreshing → LoggedIn (refresh succeeded)
//! - LoggedIn → Refreshing → LoggedOut (refresh failed and the policy says logout)
//! - any → LoggedOut (`logout`)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use session_auth::{
    Error, RedirectHandler, SessionState, StoredToken, TokenExchanger, TokenStore,
    build_authorization_url,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::policy::{RefreshFailureAction, RefreshPolicy};
use crate::presenter::AuthorizationPresenter;
use crate::signal::{UnauthorizedListener, spawn_unauthorized_listener};

/// Completion callback for `login`.
pub type LoginComplete = Box<dyn FnOnce() + Send>;

/// Error callback for `login`. Invoked at most once per login request.
pub type LoginFailed = Box<dyn FnOnce(Error) + Send>;

/// Externally visible session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    LoggedOut,
    /// Authorization URL presented, waiting for the redirect
    Authorizing,
    LoggedIn,
    /// A refresh call is in flight
    Refreshing,
}

impl SessionPhase {
    /// Label for logging and status output.
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::LoggedOut => "logged_out",
            SessionPhase::Authorizing => "authorizing",
            SessionPhase::LoggedIn => "logged_in",
            SessionPhase::Refreshing => "refreshing",
        }
    }
}

/// What started a refresh.
#[derive(Debug, Clone, Copy)]
enum RefreshTrigger {
    Expired,
    Unauthorized,
}

impl RefreshTrigger {
    fn label(self) -> &'static str {
        match self {
            RefreshTrigger::Expired => "expired",
            RefreshTrigger::Unauthorized => "unauthorized",
        }
    }
}

/// Callbacks of the login waiting for its redirect.
struct PendingLogin {
    on_complete: LoginComplete,
    on_error: LoginFailed,
}

/// State guarded by the transition lock.
#[derive(Default)]
struct Inner {
    pending: Option<PendingLogin>,
}

/// Snapshot of the token epoch and refresh attempt count.
///
/// Taken before waiting on the transition lock. If it moved by the time the
/// lock is held, a refresh or logout ran in the meantime and its outcome
/// stands for the waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Generation {
    epoch: u64,
    attempts: u64,
}

/// Clears the refreshing flag even if the refresh future is dropped.
struct RefreshingGuard<'a>(&'a AtomicBool);

impl<'a> RefreshingGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RefreshingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the single session of a host application.
///
/// Construct one per process at the composition root and share the `Arc`.
pub struct SessionController {
    redirect: RedirectHandler,
    store: TokenStore,
    presenter: Arc<dyn AuthorizationPresenter>,
    policy: RefreshPolicy,
    inner: Mutex<Inner>,
    refreshing: AtomicBool,
    /// Bumped whenever the stored token is replaced or cleared
    epoch: AtomicU64,
    /// Bumped when a refresh attempt finishes, whatever its outcome
    refresh_attempts: AtomicU64,
    listener: OnceLock<JoinHandle<()>>,
}

impl SessionController {
    /// Build the controller and start listening for unauthorized signals.
    ///
    /// `store` must already be bound to this credential's hash (see
    /// `TokenStore::open`). Must be called from within a tokio runtime.
    pub fn new(
        exchanger: TokenExchanger,
        store: TokenStore,
        presenter: Arc<dyn AuthorizationPresenter>,
        unauthorized: UnauthorizedListener,
        policy: RefreshPolicy,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            redirect: RedirectHandler::new(exchanger),
            store,
            presenter,
            policy,
            inner: Mutex::new(Inner::default()),
            refreshing: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            refresh_attempts: AtomicU64::new(0),
            listener: OnceLock::new(),
        });
        let handle = spawn_unauthorized_listener(Arc::downgrade(&controller), unauthorized);
        let _ = controller.listener.set(handle);
        controller
    }

    /// Start the authorization-code flow.
    ///
    /// Builds the authorization URL and hands it to the presenter. If the URL
    /// cannot be built, `on_error` receives a `Configuration` error right
    /// away. A login already waiting for its redirect is abandoned: its
    /// presentation is dismissed and its callbacks are dropped uninvoked.
    pub async fn login<C, E>(&self, on_complete: C, on_error: E)
    where
        C: FnOnce() + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        let mut inner = self.inner.lock().await;
        self.abandon_pending(&mut inner);

        let url = match build_authorization_url(self.redirect.exchanger().config()) {
            Ok(url) => url,
            Err(e) => {
                drop(inner);
                warn!(error = %e, "cannot build authorization URL");
                on_error(e);
                return;
            }
        };

        self.presenter.present(&url);
        inner.pending = Some(PendingLogin {
            on_complete: Box::new(on_complete),
            on_error: Box::new(on_error),
        });
        info!(phase = SessionPhase::Authorizing.label(), "authorization started");
    }

    /// `logout` followed by `login` with the same callbacks.
    pub async fn relogin<C, E>(&self, on_complete: C, on_error: E)
    where
        C: FnOnce() + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        self.logout().await;
        self.login(on_complete, on_error).await;
    }

    /// Clear the session unconditionally and abandon any pending login.
    ///
    /// Waits for an in-flight refresh to finish first. Calling it twice is
    /// harmless.
    pub async fn logout(&self) {
        let mut inner = self.inner.lock().await;
        self.abandon_pending(&mut inner);
        self.clear_session("user").await;
    }

    /// Redirect entry point. Returns true if the URL was consumed.
    ///
    /// Only meaningful while authorizing; in any other phase nothing is
    /// consumed. URLs that do not belong to the configured redirect URI are
    /// left alone and the login keeps waiting.
    pub async fn handle_redirect(&self, url: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(pending) = inner.pending.take() else {
            debug!("redirect received while not authorizing, ignoring");
            return false;
        };

        let Some(result) = self.redirect.handle(url).await else {
            inner.pending = Some(pending);
            return false;
        };

        self.presenter.dismiss();
        match result {
            Ok(pair) => {
                let hash = self.store.read().await.credential_hash;
                let state = SessionState {
                    credential_hash: hash,
                    token: Some(StoredToken::issued_now(pair)),
                };
                if let Err(e) = self.store.write(state).await {
                    warn!(error = %e, "failed to persist session after login");
                }
                self.epoch.fetch_add(1, Ordering::SeqCst);
                drop(inner);
                info!(phase = SessionPhase::LoggedIn.label(), "login completed");
                (pending.on_complete)();
            }
            Err(e) => {
                drop(inner);
                warn!(error = %e, kind = e.kind(), "login failed");
                (pending.on_error)(e);
            }
        }
        true
    }

    /// Report that the user closed the authorization page.
    ///
    /// The pending login fails with `UserCancelled`. Returns false when no
    /// login was pending.
    pub async fn cancel_authorization(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(pending) = inner.pending.take() else {
            return false;
        };
        self.presenter.dismiss();
        drop(inner);
        info!("authorization cancelled by user");
        (pending.on_error)(Error::UserCancelled);
        true
    }

    /// A valid access token, refreshing inline if the stored one expired.
    ///
    /// May wait on network I/O. Concurrent callers during a refresh wait for
    /// it and share its outcome rather than starting their own, even when it
    /// failed. Returns `None` without a session or when the refresh failed.
    pub async fn current_access_token(&self) -> Option<String> {
        let seen = self.generation();
        if let Some(token) = self.store.read().await.token
            && !token.is_expired()
        {
            return Some(token.pair.access_token);
        }

        let _inner = self.inner.lock().await;
        // Re-check: another caller may have refreshed while we waited
        let token = self.store.read().await.token?;
        if !token.is_expired() {
            return Some(token.pair.access_token);
        }
        if self.generation().attempts != seen.attempts {
            debug!("refresh failed while waiting, not retrying");
            return None;
        }
        self.refresh_locked(token, RefreshTrigger::Expired).await
    }

    /// Current phase of the state machine.
    pub async fn phase(&self) -> SessionPhase {
        if self.refreshing.load(Ordering::SeqCst) {
            return SessionPhase::Refreshing;
        }
        let inner = self.inner.lock().await;
        if inner.pending.is_some() {
            SessionPhase::Authorizing
        } else if self.store.read().await.is_logged_in() {
            SessionPhase::LoggedIn
        } else {
            SessionPhase::LoggedOut
        }
    }

    /// Both access and refresh tokens are present.
    pub async fn is_logged_in(&self) -> bool {
        self.store.read().await.is_logged_in()
    }

    /// Snapshot of the persisted session, for status reporting.
    pub async fn session_state(&self) -> SessionState {
        self.store.read().await
    }

    /// Number of refresh attempts finished so far, successful or not.
    ///
    /// Hosts that publish an unauthorized signal can watch this to learn when
    /// the forced refresh has run.
    pub fn refresh_attempts(&self) -> u64 {
        self.refresh_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn generation(&self) -> Generation {
        Generation {
            epoch: self.epoch.load(Ordering::SeqCst),
            attempts: self.refresh_attempts(),
        }
    }

    /// Forced refresh after an unauthorized signal.
    ///
    /// `seen` is the generation when the signal was picked up. If a refresh
    /// attempt finished or the token changed while we waited for the lock,
    /// that already answered the signal and nothing more is done.
    pub(crate) async fn refresh_after_unauthorized(&self, seen: Generation) {
        let _inner = self.inner.lock().await;
        if self.generation() != seen {
            debug!("session changed since unauthorized signal, skipping refresh");
            return;
        }
        let Some(token) = self.store.read().await.token else {
            debug!("unauthorized signal without a session, nothing to refresh");
            return;
        };
        self.refresh_locked(token, RefreshTrigger::Unauthorized)
            .await;
    }

    /// Refresh with the transition lock held. Counts as one attempt.
    async fn refresh_locked(&self, token: StoredToken, trigger: RefreshTrigger) -> Option<String> {
        let access_token = self.refresh_once(token, trigger).await;
        self.refresh_attempts.fetch_add(1, Ordering::SeqCst);
        access_token
    }

    async fn refresh_once(&self, token: StoredToken, trigger: RefreshTrigger) -> Option<String> {
        if token.pair.refresh_token.is_empty() {
            warn!(trigger = trigger.label(), "no refresh token, logging out");
            metrics::record_refresh(trigger.label(), "missing_refresh_token");
            self.clear_session("missing_refresh_token").await;
            return None;
        }

        debug!(trigger = trigger.label(), "refreshing access token");
        let result = {
            let _refreshing = RefreshingGuard::set(&self.refreshing);
            self.redirect
                .exchanger()
                .refresh(&token.pair.refresh_token)
                .await
        };

        match result {
            Ok(pair) => {
                let access_token = pair.access_token.clone();
                let hash = self.store.read().await.credential_hash;
                let state = SessionState {
                    credential_hash: hash,
                    token: Some(StoredToken::issued_now(pair)),
                };
                if let Err(e) = self.store.write(state).await {
                    warn!(error = %e, "failed to persist refreshed token");
                }
                self.epoch.fetch_add(1, Ordering::SeqCst);
                metrics::record_refresh(trigger.label(), "success");
                info!(trigger = trigger.label(), "token refresh succeeded");
                Some(access_token)
            }
            Err(e) => {
                metrics::record_refresh(trigger.label(), e.kind());
                match self.policy.classify(&e) {
                    RefreshFailureAction::Logout => {
                        warn!(trigger = trigger.label(), error = %e, "token refresh failed, logging out");
                        self.clear_session("refresh_failed").await;
                    }
                    RefreshFailureAction::KeepSession => {
                        warn!(trigger = trigger.label(), error = %e, "token refresh failed, keeping session");
                    }
                }
                None
            }
        }
    }

    /// Dismiss the presenter and drop the pending callbacks uninvoked.
    fn abandon_pending(&self, inner: &mut Inner) {
        if inner.pending.take().is_some() {
            self.presenter.dismiss();
            info!("pending authorization abandoned");
        }
    }

    async fn clear_session(&self, reason: &'static str) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to persist cleared session");
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        metrics::record_logout(reason);
        info!(reason, phase = SessionPhase::LoggedOut.label(), "session cleared");
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.get() {
            handle.abort();
        }
    }
}
