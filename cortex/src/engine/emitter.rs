//! Event emitter: envelope wrapping, live reduction, channel send.
//!
//! All events leave the engine through one [`Emitter`], which assigns the
//! envelope (seq, ts), folds the event into the live [`RunReduction`] (the
//! source of `STEP_STATUS` snapshots), and sends it down the bounded channel.
//! A closed channel means the consumer dropped the stream; the driver stops
//! quietly at the next emission.

use brain_event::{BrainEvent, EnvelopeState, EventKind};
use tokio::sync::mpsc;

use crate::reducer::{self, RunReduction};

/// Marker: the stream consumer is gone; stop driving.
pub(crate) struct StreamClosed;

pub(crate) struct Emitter {
    tx: mpsc::Sender<BrainEvent>,
    envelope: EnvelopeState,
    reduction: RunReduction,
}

impl Emitter {
    pub(crate) fn new(tx: mpsc::Sender<BrainEvent>, envelope: EnvelopeState) -> Self {
        Self {
            tx,
            envelope,
            reduction: RunReduction::default(),
        }
    }

    /// Emitter seeded with a replayed reduction (resume path).
    pub(crate) fn resuming(
        tx: mpsc::Sender<BrainEvent>,
        envelope: EnvelopeState,
        reduction: RunReduction,
    ) -> Self {
        Self {
            tx,
            envelope,
            reduction,
        }
    }

    pub(crate) async fn emit(&mut self, kind: EventKind) -> Result<(), StreamClosed> {
        let event = self.envelope.wrap(kind);
        if let Err(e) = reducer::reduce(&mut self.reduction, &event) {
            // live reduction only fails on unapplicable patches, which the
            // engine itself produced; log loudly but keep the stream coherent
            tracing::warn!(error = %e, kind = event.kind.name(), "live reduction failed");
        }
        tracing::debug!(kind = event.kind.name(), seq = event.seq, "emit");
        self.tx.send(event).await.map_err(|_| StreamClosed)
    }

    /// Emits a `STEP_STATUS` snapshot of the current step tree.
    pub(crate) async fn emit_step_status(&mut self) -> Result<(), StreamClosed> {
        let steps = self.reduction.step_tree.clone();
        self.emit(EventKind::StepStatus { steps }).await
    }

    pub(crate) fn reduction(&self) -> &RunReduction {
        &self.reduction
    }
}
