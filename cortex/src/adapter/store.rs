//! In-memory event store keyed by run id.
//!
//! The host-side shape for storing event logs across concurrent runs: one
//! ordered log per `brain_run_id`. A store is itself an [`Adapter`], so a
//! single instance can hang off a runner shared by many runs and each run's
//! log stays separate. Pair `events_for` with `resume` to continue a paused
//! run.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use brain_event::BrainEvent;

use super::{Adapter, AdapterError};

/// Ordered event logs per run id.
#[derive(Default)]
pub struct InMemoryEventStore {
    runs: Mutex<HashMap<String, Vec<BrainEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one event under its run id.
    pub fn append(&self, event: BrainEvent) {
        self.runs
            .lock()
            .expect("runs lock")
            .entry(event.brain_run_id.clone())
            .or_default()
            .push(event);
    }

    /// The stored log for one run, in append order.
    pub fn events_for(&self, brain_run_id: &str) -> Vec<BrainEvent> {
        self.runs
            .lock()
            .expect("runs lock")
            .get(brain_run_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Run ids with at least one stored event.
    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.lock().expect("runs lock").keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drops one run's log (e.g. after it completes and the host archives it).
    pub fn remove(&self, brain_run_id: &str) -> Option<Vec<BrainEvent>> {
        self.runs.lock().expect("runs lock").remove(brain_run_id)
    }
}

#[async_trait]
impl Adapter for InMemoryEventStore {
    async fn dispatch(&self, event: &BrainEvent) -> Result<(), AdapterError> {
        self.append(event.clone());
        Ok(())
    }
}
