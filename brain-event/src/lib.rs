//! Brain run event model: typed events + run envelope + canonical JSON wire form.
//!
//! This crate defines the tagged union of events a brain run emits, the
//! `SerializedStep` tree watchers consume, and the envelope fields shared by
//! every event (`brain_run_id`, `options`, monotone `seq`, `ts`). It does not
//! depend on cortex; the engine constructs [`BrainEvent`]s through an
//! [`EnvelopeState`] and hosts persist them via [`BrainEvent::to_canonical_json`].

pub mod envelope;
pub mod event;
pub mod step;
pub mod structure;

pub use envelope::EnvelopeState;
pub use event::{
    BatchItemResult, BrainEvent, EventKind, SerializedError, WebhookRegistration, WireError,
};
pub use step::{SerializedStep, StepExecutionStatus};
pub use structure::{BrainStructure, StepNode, StepType};
