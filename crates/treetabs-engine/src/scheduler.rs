//! Coalescing scheduler for debounced recomputations.
//!
//! Each kind has at most one pending timer. A new request for a kind aborts
//! the pending timer and starts a fresh one, so a burst of requests fires
//! once, one delay after the last request. Timers report on a channel
//! owned by the event loop; a report whose generation no longer matches is
//! dropped, which covers a timer that fired just before it was aborted.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Recomputations driven by the window event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecomputeKind {
    /// Indent unit and level map.
    Indent,
    /// Tab bar overflow.
    Layout,
}

/// A timer that elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired<K> {
    pub kind: K,
    generation: u64,
}

#[derive(Debug)]
struct PendingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Debounces requests per kind.
///
/// Must be used inside a tokio runtime.
#[derive(Debug)]
pub struct CoalescingScheduler<K> {
    pending: HashMap<K, PendingTimer>,
    generation: u64,
    fired_tx: mpsc::UnboundedSender<Fired<K>>,
}

impl<K> CoalescingScheduler<K>
where
    K: Copy + Eq + Hash + Debug + Send + 'static,
{
    /// Creates a scheduler and the receiver its timers report to.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fired<K>>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = CoalescingScheduler {
            pending: HashMap::new(),
            generation: 0,
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    /// Schedules `kind` to fire after `delay`, replacing any pending timer
    /// of the same kind.
    pub fn request(&mut self, kind: K, delay: Duration) {
        self.generation += 1;
        let generation = self.generation;
        let tx = self.fired_tx.clone();
        let deadline = Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(Fired { kind, generation });
        });

        if let Some(previous) = self.pending.insert(kind, PendingTimer { generation, handle }) {
            previous.handle.abort();
            tracing::trace!(?kind, "coalesced recompute request");
        }
    }

    /// Returns true if `fired` is the current timer of its kind, and marks
    /// the kind idle.
    pub fn accept(&mut self, fired: &Fired<K>) -> bool {
        match self.pending.get(&fired.kind) {
            Some(timer) if timer.generation == fired.generation => {
                self.pending.remove(&fired.kind);
                true
            }
            _ => {
                tracing::trace!(kind = ?fired.kind, "stale timer ignored");
                false
            }
        }
    }

    /// Cancels the pending timer of `kind`, if any.
    pub fn cancel(&mut self, kind: K) {
        if let Some(timer) = self.pending.remove(&kind) {
            timer.handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.pending.drain() {
            timer.handle.abort();
        }
    }

    #[must_use]
    pub fn is_pending(&self, kind: K) -> bool {
        self.pending.contains_key(&kind)
    }
}

impl<K> Drop for CoalescingScheduler<K> {
    fn drop(&mut self) {
        for timer in self.pending.values() {
            timer.handle.abort();
        }
    }
}
