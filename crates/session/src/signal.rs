//! Unauthorized signal channel
//!
//! Any API call site that receives an authorization failure publishes on the
//! `UnauthorizedSignal`. The single `UnauthorizedListener` is moved into the
//! `SessionController` constructor; there is no way to subscribe a second
//! listener.
//!
//! Built on `tokio::sync::watch`: the listener only learns that at least one
//! signal arrived since it last looked, so a burst of reports collapses into
//! a single wakeup.

use std::sync::Arc;
use std::sync::Weak;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::controller::SessionController;

/// Publisher half. Cheap to clone; hand one to every API client.
#[derive(Debug, Clone)]
pub struct UnauthorizedSignal {
    tx: Arc<watch::Sender<u64>>,
}

/// Subscriber half. Not cloneable.
#[derive(Debug)]
pub struct UnauthorizedListener {
    rx: watch::Receiver<u64>,
}

/// Create the publisher/listener pair.
pub fn unauthorized_channel() -> (UnauthorizedSignal, UnauthorizedListener) {
    let (tx, rx) = watch::channel(0u64);
    (
        UnauthorizedSignal { tx: Arc::new(tx) },
        UnauthorizedListener { rx },
    )
}

impl UnauthorizedSignal {
    /// Report an authorization failure. Fire-and-forget.
    pub fn publish(&self) {
        self.tx.send_modify(|count| *count = count.wrapping_add(1));
    }
}

impl UnauthorizedListener {
    /// Wait for the next signal. Returns false once every publisher is gone.
    pub async fn recv(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Mark every signal published so far as seen.
    pub fn absorb_pending(&mut self) {
        self.rx.borrow_and_update();
    }
}

/// Spawn the task that turns signals into forced refreshes.
///
/// Holds only a `Weak` reference, so dropping the controller ends the task.
/// Signals published while the forced refresh runs are absorbed by it.
pub(crate) fn spawn_unauthorized_listener(
    controller: Weak<SessionController>,
    mut listener: UnauthorizedListener,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while listener.recv().await {
            let Some(controller) = controller.upgrade() else {
                break;
            };
            let seen = controller.generation();
            debug!(?seen, "unauthorized signal received");
            controller.refresh_after_unauthorized(seen).await;
            listener.absorb_pending();
        }
        info!("unauthorized listener stopped");
    })
}
