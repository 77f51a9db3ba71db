//! Adapter fan-out: pluggable consumers of the event stream.
//!
//! Adapters observe events for side effects (observability, persistence,
//! memory indexing). The fan-out dispatches each event to every adapter in
//! registration order, after the event is emitted; an adapter failure is
//! logged and swallowed, never aborting the run. Each adapter sees each
//! event exactly once per run — resume does not re-dispatch events that
//! predate the pause, so persisting adapters must dedupe across host
//! restarts themselves.

mod memory_index;
mod store;

pub use memory_index::MemoryIndexingAdapter;
pub use store::InMemoryEventStore;

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use brain_event::BrainEvent;
use thiserror::Error;

/// Error from an adapter dispatch; logged by the fan-out and swallowed.
#[derive(Debug, Error)]
#[error("adapter: {0}")]
pub struct AdapterError(pub String);

/// A side-effecting consumer of the event stream.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn dispatch(&self, event: &BrainEvent) -> Result<(), AdapterError>;
}

/// Ordered fan-out over a set of adapters.
#[derive(Clone, Default)]
pub struct AdapterFanout {
    adapters: Vec<Arc<dyn Adapter>>,
}

impl AdapterFanout {
    pub fn new(adapters: Vec<Arc<dyn Adapter>>) -> Self {
        Self { adapters }
    }

    /// Dispatches one event to every adapter in order, swallowing failures.
    pub async fn dispatch(&self, event: &BrainEvent) {
        for adapter in &self.adapters {
            if let Err(e) = adapter.dispatch(event).await {
                tracing::warn!(error = %e, kind = event.kind.name(), "adapter dispatch failed");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Logs every event at debug level.
#[derive(Debug, Default)]
pub struct TracingAdapter;

#[async_trait]
impl Adapter for TracingAdapter {
    async fn dispatch(&self, event: &BrainEvent) -> Result<(), AdapterError> {
        tracing::debug!(
            kind = event.kind.name(),
            seq = event.seq,
            brain_run_id = %event.brain_run_id,
            "event"
        );
        Ok(())
    }
}

/// Collects events in memory, in arrival order.
///
/// The in-memory event log: tests and hosts use it to persist a paused run's
/// history and hand it back to `resume`.
#[derive(Default)]
pub struct CollectingAdapter {
    events: Mutex<Vec<BrainEvent>>,
}

impl CollectingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the collected events.
    pub fn events(&self) -> Vec<BrainEvent> {
        self.events.lock().expect("events lock").clone()
    }
}

#[async_trait]
impl Adapter for CollectingAdapter {
    async fn dispatch(&self, event: &BrainEvent) -> Result<(), AdapterError> {
        self.events.lock().expect("events lock").push(event.clone());
        Ok(())
    }
}

/// Appends each event as one canonical JSON line to a writer.
///
/// This is the wire shape hosts persist; pair with `BrainEvent::from_json`
/// to reload a log.
pub struct CanonicalJsonAdapter<W: Write + Send> {
    sink: Mutex<W>,
}

impl<W: Write + Send> CanonicalJsonAdapter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub fn into_inner(self) -> W {
        self.sink.into_inner().expect("sink lock")
    }
}

#[async_trait]
impl<W: Write + Send> Adapter for CanonicalJsonAdapter<W> {
    async fn dispatch(&self, event: &BrainEvent) -> Result<(), AdapterError> {
        let line = event
            .to_canonical_json()
            .map_err(|e| AdapterError(e.to_string()))?;
        let mut sink = self.sink.lock().expect("sink lock");
        writeln!(sink, "{}", line).map_err(|e| AdapterError(e.to_string()))
    }
}
