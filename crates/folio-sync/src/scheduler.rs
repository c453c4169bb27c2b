//! Debounced save scheduling.
//!
//! [`SaveTimer`] owns at most one pending timer task. Every `arm` cancels the
//! previous one and issues a new token; a timer only fires if its token is
//! still current when the quiet period elapses, so a cancelled timer never
//! triggers a save even if its task was already past the sleep.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Slot {
    token: u64,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug)]
pub struct SaveTimer {
    quiet_period: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl SaveTimer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Start (or restart) the quiet period. `fire` runs once it elapses,
    /// unless the timer is cancelled or re-armed first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F, Fut>(&self, fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        slot.token += 1;
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }

        let token = slot.token;
        let shared = Arc::clone(&self.slot);
        let quiet_period = self.quiet_period;
        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            if take_fired(&shared, token) {
                fire().await;
            }
        }));
    }

    /// Cancel the pending timer. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let mut slot = lock(&self.slot);
        slot.token += 1;
        match slot.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.slot).handle.is_some()
    }
}

impl Drop for SaveTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Claim the firing for `token`. The handle is detached rather than aborted:
/// from here on the task runs the save and must not be cancelled by a later
/// `arm`.
fn take_fired(slot: &Mutex<Slot>, token: u64) -> bool {
    let mut slot = lock(slot);
    if slot.token != token {
        return false;
    }
    slot.handle = None;
    true
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
