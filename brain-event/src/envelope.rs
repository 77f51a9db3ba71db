//! Per-run envelope state: assigns `seq` and a monotone timestamp to each
//! event. One `EnvelopeState` exists per engine task; resume constructs it
//! with the stored log's continuation point so `seq` never repeats.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::event::{BrainEvent, EventKind};

/// Envelope state for one run: run id, options echoed on every event, next
/// sequence number, and the last timestamp handed out.
#[derive(Clone, Debug)]
pub struct EnvelopeState {
    brain_run_id: String,
    options: Value,
    next_seq: u64,
    last_ts: DateTime<Utc>,
}

impl EnvelopeState {
    /// Fresh envelope for a new run; `seq` starts at 0.
    pub fn new(brain_run_id: impl Into<String>, options: Value) -> Self {
        Self {
            brain_run_id: brain_run_id.into(),
            options,
            next_seq: 0,
            last_ts: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Envelope continuing a stored log: the next event gets `last_seq + 1`.
    pub fn resuming(brain_run_id: impl Into<String>, options: Value, last_seq: u64) -> Self {
        Self {
            brain_run_id: brain_run_id.into(),
            options,
            next_seq: last_seq + 1,
            last_ts: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn brain_run_id(&self) -> &str {
        &self.brain_run_id
    }

    pub fn options(&self) -> &Value {
        &self.options
    }

    /// Wraps a payload into the next event: assigns `seq` and a timestamp
    /// clamped to be monotone non-decreasing within the run.
    pub fn wrap(&mut self, kind: EventKind) -> BrainEvent {
        let now = Utc::now();
        let ts = if now < self.last_ts { self.last_ts } else { now };
        self.last_ts = ts;
        let seq = self.next_seq;
        self.next_seq += 1;
        BrainEvent {
            brain_run_id: self.brain_run_id.clone(),
            options: self.options.clone(),
            seq,
            ts,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Consecutive wraps hand out strictly increasing seq and
    /// non-decreasing timestamps.
    #[test]
    fn wrap_assigns_monotone_envelope() {
        let mut env = EnvelopeState::new("run-1", Value::Null);
        let a = env.wrap(EventKind::Resumed);
        let b = env.wrap(EventKind::Cancelled);
        assert_eq!(a.seq, 0);
        assert_eq!(b.seq, 1);
        assert!(b.ts >= a.ts);
        assert_eq!(a.brain_run_id, "run-1");
    }

    /// **Scenario**: A resuming envelope continues after the stored last seq.
    #[test]
    fn resuming_continues_seq() {
        let mut env = EnvelopeState::resuming("run-1", Value::Null, 41);
        let ev = env.wrap(EventKind::Resumed);
        assert_eq!(ev.seq, 42);
    }

    /// **Scenario**: Options are echoed onto every wrapped event.
    #[test]
    fn options_echoed() {
        let opts = serde_json::json!({"tone": "brief"});
        let mut env = EnvelopeState::new("run-9", opts.clone());
        let ev = env.wrap(EventKind::Resumed);
        assert_eq!(ev.options, opts);
    }
}
