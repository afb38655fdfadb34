use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::models::Task;
use crate::notify::Notifier;
use crate::remote::Remote;

pub const REORDER_DEBOUNCE: Duration = Duration::from_secs(1);

/// Background whole-list push with at-most-one-in-flight semantics: scheduling
/// a push aborts a pending older one. Cancellation is safe because every push
/// carries the complete current list, so the newest push subsumes the rest.
///
/// Must be used from within a Tokio runtime.
pub struct Syncer {
    remote: Arc<dyn Remote>,
    notifier: Arc<dyn Notifier>,
    inflight: Mutex<Option<JoinHandle<()>>>,
    generation: Arc<AtomicU64>,
    pending_tx: watch::Sender<bool>,
    debounce: Duration,
}

impl Syncer {
    pub fn new(remote: Arc<dyn Remote>, notifier: Arc<dyn Notifier>) -> Self {
        Syncer {
            remote,
            notifier,
            inflight: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            pending_tx: watch::channel(false).0,
            debounce: REORDER_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Push the list now.
    pub fn push(&self, list: Vec<Task>, success_message: &'static str) {
        self.schedule(list, success_message, None);
    }

    /// Push after the debounce window. A following push (debounced or not)
    /// supersedes this one; rapid reorder gestures coalesce into one request.
    pub fn push_debounced(&self, list: Vec<Task>, success_message: &'static str) {
        self.schedule(list, success_message, Some(self.debounce));
    }

    /// Pending-sync indicator: `true` from the moment a push is scheduled
    /// until the latest one resolves.
    pub fn pending(&self) -> watch::Receiver<bool> {
        self.pending_tx.subscribe()
    }

    /// Awaits the most recently scheduled push.
    pub async fn wait_idle(&self) {
        let handle = self.inflight.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn schedule(&self, list: Vec<Task>, success_message: &'static str, delay: Option<Duration>) {
        let seq = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.pending_tx.send_replace(true);

        let remote = Arc::clone(&self.remote);
        let notifier = Arc::clone(&self.notifier);
        let generation = Arc::clone(&self.generation);
        let pending = self.pending_tx.clone();

        let handle = tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            match remote.put_list(&list).await {
                Ok(_) => notifier.success(success_message),
                Err(err) => {
                    warn!(%err, "todo list push failed, local copy kept");
                    notifier.error(
                        "Error updating todo list. Changes are saved on this device only \
                         and may be lost when the page is closed.",
                    );
                }
            }

            // Only the newest push may clear the indicator.
            pending.send_modify(|flag| {
                if generation.load(Ordering::Acquire) == seq {
                    *flag = false;
                }
            });
        });

        let mut inflight = self.inflight.lock().unwrap();
        if let Some(prev) = inflight.replace(handle) {
            prev.abort();
        }
    }
}
