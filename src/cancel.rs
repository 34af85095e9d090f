/*!
 * Cooperative cancellation shared between the CLI and the pipelines.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    raised: AtomicBool,
    notify: Notify,
}

/// Flag raised once on interrupt. Pipelines check it before starting each
/// new batch or download, and waits such as retry backoff end early on it.
/// Work already in flight runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<Inner>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.raised.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.raised.load(Ordering::SeqCst)
    }

    /// Resolve once the flag is raised
    pub async fn cancelled(&self) {
        // Registered before the check so a concurrent `cancel` is not missed
        let notified = self.0.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}
