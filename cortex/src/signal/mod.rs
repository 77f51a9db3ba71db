//! Control signals and the provider contract delivering them to the engine.
//!
//! Signals are host-originated; the engine never creates them. `take` returns
//! the highest-priority queued signal matching a filter and removes it, with
//! `KILL > PAUSE > WEBHOOK_RESPONSE > USER_MESSAGE > RESUME`. Ties within one
//! kind resolve FIFO. [`QueueSignalProvider`] is the in-memory implementation
//! hosts and tests queue into.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};

/// A host → engine control message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Kill,
    Pause,
    Resume,
    UserMessage { content: String },
    WebhookResponse { response: Value },
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::Kill => SignalKind::Kill,
            Signal::Pause => SignalKind::Pause,
            Signal::Resume => SignalKind::Resume,
            Signal::UserMessage { .. } => SignalKind::UserMessage,
            Signal::WebhookResponse { .. } => SignalKind::WebhookResponse,
        }
    }
}

/// Signal kind, used for `take` filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Kill,
    Pause,
    Resume,
    UserMessage,
    WebhookResponse,
}

impl SignalKind {
    /// Strict priority; higher wins.
    pub fn priority(self) -> u8 {
        match self {
            SignalKind::Kill => 4,
            SignalKind::Pause => 3,
            SignalKind::WebhookResponse => 2,
            SignalKind::UserMessage => 1,
            SignalKind::Resume => 0,
        }
    }
}

/// Delivers typed control signals to a running engine.
///
/// Owned by the host. `take` with `non_blocking = true` returns immediately;
/// with `non_blocking = false` it waits until a matching signal is queued.
/// The engine relies on `take` being atomic: a signal is either returned and
/// removed, or left queued — a cancelled `take` never loses a signal.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Removes and returns the highest-priority queued signal whose kind is in
    /// `filter`, or `None` when non-blocking and nothing matches.
    async fn take(&self, filter: &[SignalKind], non_blocking: bool) -> Option<Signal>;

    /// Returns the highest-priority queued signal without removing it.
    async fn peek(&self) -> Option<Signal>;

    /// Queues a signal. Used by hosting code and tests.
    async fn queue(&self, signal: Signal);
}

/// In-memory signal queue with priority-ordered, FIFO-stable `take`.
#[derive(Default)]
pub struct QueueSignalProvider {
    queue: Mutex<Vec<Signal>>,
    notify: Notify,
}

impl QueueSignalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the best matching signal: highest priority, earliest queued.
    fn best_index(queue: &[Signal], filter: &[SignalKind]) -> Option<usize> {
        let mut best: Option<(usize, u8)> = None;
        for (i, sig) in queue.iter().enumerate() {
            let kind = sig.kind();
            if !filter.contains(&kind) {
                continue;
            }
            let prio = kind.priority();
            match best {
                Some((_, best_prio)) if best_prio >= prio => {}
                _ => best = Some((i, prio)),
            }
        }
        best.map(|(i, _)| i)
    }
}

#[async_trait]
impl SignalProvider for QueueSignalProvider {
    async fn take(&self, filter: &[SignalKind], non_blocking: bool) -> Option<Signal> {
        loop {
            {
                let mut queue = self.queue.lock().await;
                if let Some(i) = Self::best_index(&queue, filter) {
                    return Some(queue.remove(i));
                }
                if non_blocking {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    async fn peek(&self) -> Option<Signal> {
        let queue = self.queue.lock().await;
        let all = [
            SignalKind::Kill,
            SignalKind::Pause,
            SignalKind::Resume,
            SignalKind::UserMessage,
            SignalKind::WebhookResponse,
        ];
        Self::best_index(&queue, &all).map(|i| queue[i].clone())
    }

    async fn queue(&self, signal: Signal) {
        self.queue.lock().await.push(signal);
        // notify_one stores a permit, so a queue before the engine's take
        // still wakes the next waiter.
        self.notify.notify_one();
    }
}
