//! Console authorization presenter

use session::AuthorizationPresenter;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use url::Url;

/// Prints the authorization URL for the user to open in a browser.
#[derive(Debug, Default)]
pub struct ConsolePresenter {
    shown: AtomicBool,
}

impl ConsolePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn is_shown(&self) -> bool {
        self.shown.load(Ordering::SeqCst)
    }
}

impl AuthorizationPresenter for ConsolePresenter {
    fn present(&self, url: &Url) {
        self.shown.store(true, Ordering::SeqCst);
        info!(host = url.host_str().unwrap_or_default(), "authorization URL ready");
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "Open this URL in your browser to log in:\n\n  {url}\n");
        let _ = out.flush();
    }

    fn dismiss(&self) {
        if self.shown.swap(false, Ordering::SeqCst) {
            info!("authorization page dismissed");
        }
    }
}
