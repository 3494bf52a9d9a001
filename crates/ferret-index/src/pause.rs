//! Cooperative suspend/resume gate for refreshes.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared pause flag.
///
/// Clones share state: pausing one handle pauses every refresh holding a
/// clone. Waiters are woken on every flip, so no transition is lost between
/// a check and a wait.
#[derive(Debug, Clone)]
pub struct PauseToken {
    tx: Arc<watch::Sender<bool>>,
}

impl PauseToken {
    #[must_use]
    pub fn new(paused: bool) -> Self {
        let (tx, _rx) = watch::channel(paused);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.set(true);
    }

    pub fn unpause(&self) {
        self.set(false);
    }

    pub fn set(&self, paused: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == paused {
                false
            } else {
                *current = paused;
                true
            }
        });
        if changed {
            tracing::debug!(paused, "pause token flipped");
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receiver notified on every flip.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolve once the token is (or becomes) unpaused.
    pub async fn wait_until_running(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for PauseToken {
    fn default() -> Self {
        Self::new(false)
    }
}
