//! Periodic refetch of the open document.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::SyncError;
use crate::session::{SyncSession, SyncStore};

const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Refetches the session's open document on an interval and on focus.
///
/// Every fetched snapshot goes through the session's reconciler. Fetch errors
/// are logged and leave the session untouched. Dropping the poller stops it;
/// it also stops on its own once every session handle is gone.
pub struct ChangePoller {
    focus: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ChangePoller {
    pub fn spawn<S: SyncStore>(session: &SyncSession<S>, interval: Duration) -> Self {
        let focus = Arc::new(Notify::new());
        let session = session.downgrade();
        let notified = Arc::clone(&focus);
        let interval = interval.max(MIN_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the document was just loaded.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = notified.notified() => {
                        tracing::debug!("focus regained, refreshing");
                        ticker.reset();
                    }
                }

                let Some(session) = session.upgrade() else {
                    break;
                };
                if session.document_id().is_none() {
                    continue;
                }
                match session.refresh().await {
                    Ok(decision) => {
                        tracing::trace!(decision = decision.as_str(), "poll complete");
                    }
                    Err(SyncError::Stale) => {}
                    Err(e) => tracing::warn!(error = %e, "poll failed"),
                }
            }
        });

        Self { focus, handle }
    }

    /// Refresh now, as when the window regains focus.
    pub fn notify_focus(&self) {
        self.focus.notify_one();
    }
}

impl Drop for ChangePoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
