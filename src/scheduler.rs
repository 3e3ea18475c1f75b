//! Debounced, cancellable delivery of query changes.
//!
//! Every `schedule` call bumps a generation counter and replaces the single
//! pending timer. A timer that fires only forwards its query if its
//! generation is still the latest, and the receiving side checks again with
//! [`SearchScheduler::is_current`], so superseded queries never reach the
//! search engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// A query whose debounce window elapsed without being superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyQuery {
    pub generation: u64,
    pub query: String,
}

pub struct SearchScheduler {
    delay: Duration,
    runtime: Handle,
    generation: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
    ready_tx: UnboundedSender<ReadyQuery>,
}

impl SearchScheduler {
    /// Creates a scheduler whose timers run on `runtime`, plus the receiver the owner drains.
    pub fn new(runtime: Handle, delay: Duration) -> (Self, UnboundedReceiver<ReadyQuery>) {
        let (ready_tx, ready_rx) = unbounded_channel();
        let scheduler = Self {
            delay,
            runtime,
            generation: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
            ready_tx,
        };
        (scheduler, ready_rx)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Starts a new debounce window for `query`, superseding any pending one.
    pub fn schedule(&self, query: impl Into<String>) -> u64 {
        let query = query.into();
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let generation = self.generation.clone();
        let tx = self.ready_tx.clone();
        let delay = self.delay;
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if generation.load(Ordering::SeqCst) != id {
                return;
            }
            let _ = tx.send(ReadyQuery { generation: id, query });
        });

        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
            debug!(superseded_by = id, "pending search cancelled");
        }
        id
    }

    /// Drops any pending query without scheduling a new one.
    pub fn cancel(&self) {
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.pending.lock().take() {
            previous.abort();
            debug!(generation = id, "pending search cancelled");
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for SearchScheduler {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.get_mut().take() {
            pending.abort();
        }
    }
}
