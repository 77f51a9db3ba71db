//! # Cortex
//!
//! A framework for defining and running **brains**: ordered, durably-resumable,
//! event-emitting execution graphs that mix deterministic computation steps
//! with LLM-driven agent loops, webhook waits, and nested sub-brains.
//!
//! ## Design principles
//!
//! - **State-in, state-out**: one JSON state flows through the steps of a
//!   level; each body returns the next state and the engine records the
//!   forward RFC-6902 patch.
//! - **The event stream is the truth**: a run is a lazy, ordered stream of
//!   [`BrainEvent`]s ending in exactly one of `COMPLETE`, `ERROR`,
//!   `CANCELLED`, or `PAUSED`. Everything a watcher or a resume needs is in
//!   the stream.
//! - **Cooperative control**: the host queues [`Signal`]s; the engine checks
//!   them at step and agent-iteration boundaries, never mid-step. KILL also
//!   cancels an in-flight LLM call through its cancellation token.
//! - **Durable resume**: a paused run's stored log replays through the pure
//!   [`reducer`] into the same context the engine held; execution continues
//!   at the suspension point without re-emitting past events.
//!
//! ## Main modules
//!
//! - [`definition`]: [`BrainDefinition`], [`StepDef`], [`AgentSpec`],
//!   [`ToolDef`] — the fluent builder and structure traversal.
//! - [`engine`]: [`engine::run`] / [`engine::resume`] — the step scheduler,
//!   agent loop, and batch execution.
//! - [`reducer`]: pure event reduction used live and during resume replay.
//! - [`resume`]: [`ResumeContext`] tree, log validation, replay agreement.
//! - [`signal`]: [`Signal`], [`SignalProvider`], [`QueueSignalProvider`].
//! - [`patch`]: RFC-6902 apply/diff over state values.
//! - [`client`]: [`ObjectGenerator`] contract and [`MockGenerator`].
//! - [`adapter`]: [`Adapter`] fan-out, tracing/collecting/canonical-JSON
//!   consumers.
//! - [`runner`]: [`BrainRunner`] — pump a run through adapters.
//! - [`context`]: [`StepContext`] and the injected capability traits.
//!
//! Event and wire types live in the `brain-event` crate and are re-exported
//! here ([`BrainEvent`], [`EventKind`], [`SerializedStep`], ...).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cortex::{BrainDefinition, BrainRunner, MockGenerator, StepReturn};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let brain = BrainDefinition::new("greeter")
//!     .step("compose", |_ctx| async move {
//!         Ok(StepReturn::state(json!({"greeting": "hello"})))
//!     })
//!     .step("sign", |ctx| async move {
//!         let mut state = ctx.state.clone();
//!         state["signed"] = json!(true);
//!         Ok(StepReturn::state(state))
//!     });
//!
//! let runner = BrainRunner::new(Arc::new(MockGenerator::with_text("unused")));
//! let outcome = runner.run(&brain, json!({}), None).await.unwrap();
//! println!("{:?}", outcome);
//! # }
//! ```

pub mod adapter;
pub mod client;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod patch;
pub mod reducer;
pub mod resume;
pub mod runner;
pub mod signal;

pub use adapter::{
    Adapter, AdapterError, AdapterFanout, CanonicalJsonAdapter, CollectingAdapter,
    InMemoryEventStore, MemoryIndexingAdapter, TracingAdapter,
};
pub use brain_event::{
    BatchItemResult, BrainEvent, BrainStructure, EnvelopeState, EventKind, SerializedError,
    SerializedStep, StepExecutionStatus, StepNode, StepType, WebhookRegistration, WireError,
};
pub use client::{
    ChatMessage, GenerateObjectRequest, GenerateTextRequest, GeneratedObject, GeneratedText,
    GeneratorError, MockGenerator, ObjectGenerator, Role, TextChunk, TokenUsage, ToolCallRequest,
    ToolDescriptor,
};
pub use context::{
    CapabilityError, MemoryProvider, NoopPages, NoopResources, Pages, Resources, StepContext,
};
pub use definition::{
    generate_dot, generate_text, resolve, validate_against, AgentSpec, BrainDefinition,
    Resolution, StepDef, StepReturn, ToolDef, ToolReturn,
};
pub use engine::{resume as resume_run, run, ResumeParams, RunParams};
pub use error::{EngineError, StepFailure};
pub use reducer::{AgentReduction, BatchReduction, Frame, RunReduction};
pub use resume::{AgentResumeState, BatchProgress, ResumeContext, WebhookResume};
pub use runner::{BrainRunner, RunOutcome};
pub use signal::{QueueSignalProvider, Signal, SignalKind, SignalProvider};

/// Unit-test tracing bootstrap: installs a `RUST_LOG`-filtered subscriber at
/// binary start so the emitter's per-event debug lines and the fan-out's
/// swallowed-failure warnings show up under `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::EnvFilter;

    #[ctor]
    fn init() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}
