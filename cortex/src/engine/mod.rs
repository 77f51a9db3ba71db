//! The brain execution engine: run and resume entry points.
//!
//! [`run`] turns a definition plus [`RunParams`] into a lazy, ordered stream
//! of [`BrainEvent`]s. The run executes on a spawned task writing into a
//! bounded channel (capacity 128), so producers cooperate with slow
//! consumers; dropping the stream stops the run at its next emission.
//!
//! [`resume`] validates a stored event log, replays it through the reducer,
//! checks agreement with the provided [`ResumeContext`], and continues the
//! run from the suspension point without re-emitting past events. Replay
//! disagreement, a corrupt log, or an unapplicable stored patch is an
//! engine-internal error surfaced as a single `ERROR` event.

mod agent_loop;
mod batch;
mod emitter;
mod scheduler;

pub(crate) use emitter::{Emitter, StreamClosed};
pub(crate) use scheduler::{LevelOutcome, LevelResume};

use std::collections::HashMap;
use std::sync::Arc;

use brain_event::{BrainEvent, EnvelopeState, EventKind};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::client::ObjectGenerator;
use crate::context::{MemoryProvider, NoopPages, NoopResources, Pages, Resources, StepContext};
use crate::definition::BrainDefinition;
use crate::reducer;
use crate::resume::{self as resume_ctx, ResumeContext};
use crate::signal::{QueueSignalProvider, Signal, SignalKind, SignalProvider};

/// Parameters for one run. Only the client is required; every capability
/// defaults to a no-op and the signal provider to an empty in-memory queue.
#[derive(Clone)]
pub struct RunParams {
    pub client: Arc<dyn ObjectGenerator>,
    pub options: Value,
    pub resources: Option<Arc<dyn Resources>>,
    pub pages: Option<Arc<dyn Pages>>,
    pub env: HashMap<String, String>,
    pub memory: Option<Arc<dyn MemoryProvider>>,
    pub signals: Option<Arc<dyn SignalProvider>>,
    pub initial_state: Option<Value>,
    pub brain_run_id: Option<String>,
}

impl RunParams {
    pub fn new(client: Arc<dyn ObjectGenerator>) -> Self {
        Self {
            client,
            options: Value::Null,
            resources: None,
            pages: None,
            env: HashMap::new(),
            memory: None,
            signals: None,
            initial_state: None,
            brain_run_id: None,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn Resources>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn with_pages(mut self, pages: Arc<dyn Pages>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_signals(mut self, signals: Arc<dyn SignalProvider>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn with_initial_state(mut self, state: Value) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_brain_run_id(mut self, id: impl Into<String>) -> Self {
        self.brain_run_id = Some(id.into());
        self
    }
}

/// Parameters for resuming a paused run: the run params plus the stored log
/// and the persisted resume context. The run id is taken from the log.
pub struct ResumeParams {
    pub run: RunParams,
    pub event_log: Vec<BrainEvent>,
    pub resume_context: ResumeContext,
}

/// Starts a run and returns its event stream.
///
/// Option validation failures surface as a single `ERROR` before any `START`.
pub fn run(def: &BrainDefinition, params: RunParams) -> ReceiverStream<BrainEvent> {
    let (tx, rx) = mpsc::channel(128);
    let def = def.clone();
    tokio::spawn(async move {
        run_task(def, params, tx).await;
    });
    ReceiverStream::new(rx)
}

/// Resumes a paused run from its stored log and context.
pub fn resume(def: &BrainDefinition, params: ResumeParams) -> ReceiverStream<BrainEvent> {
    let (tx, rx) = mpsc::channel(128);
    let def = def.clone();
    tokio::spawn(async move {
        resume_task(def, params, tx).await;
    });
    ReceiverStream::new(rx)
}

async fn run_task(def: BrainDefinition, params: RunParams, tx: mpsc::Sender<BrainEvent>) {
    let brain_run_id = params
        .brain_run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let envelope = EnvelopeState::new(&brain_run_id, params.options.clone());
    let mut emitter = Emitter::new(tx, envelope);

    if let Err(failure) = def.validate_options(&params.options) {
        let _ = emitter
            .emit(EventKind::Error {
                error: failure.serialized(),
            })
            .await;
        return;
    }

    let initial_state = params
        .initial_state
        .clone()
        .unwrap_or_else(|| serde_json::json!({}));
    let mut driver = Driver::from_params(params, emitter, brain_run_id);
    let _ = driver.drive_fresh(&def, initial_state).await;
}

async fn resume_task(def: BrainDefinition, params: ResumeParams, tx: mpsc::Sender<BrainEvent>) {
    let ResumeParams {
        run,
        event_log,
        resume_context,
    } = params;

    let brain_run_id = event_log
        .first()
        .map(|e| e.brain_run_id.clone())
        .or_else(|| run.brain_run_id.clone())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let last_seq = event_log.last().map(|e| e.seq).unwrap_or(0);
    let envelope = EnvelopeState::resuming(&brain_run_id, run.options.clone(), last_seq);

    let replayed = resume_ctx::validate_log(&event_log)
        .and_then(|_| reducer::replay(&event_log))
        .and_then(|reduction| {
            resume_ctx::check_agreement(&reduction, &resume_context)?;
            Ok(reduction)
        });

    match replayed {
        Err(engine_error) => {
            tracing::warn!(error = %engine_error, "resume rejected");
            let mut emitter = Emitter::new(tx, envelope);
            let _ = emitter
                .emit(EventKind::Error {
                    error: engine_error.serialized(),
                })
                .await;
        }
        Ok(reduction) => {
            let emitter = Emitter::resuming(tx, envelope, reduction);
            let mut driver = Driver::from_params(run, emitter, brain_run_id);
            let _ = driver.drive_resumed(&def, resume_context).await;
        }
    }
}

/// One run's executor: holds the injected capabilities and the emitter, and
/// walks the step list level by level. Created per run; nothing is shared
/// across runs.
pub(crate) struct Driver {
    pub(crate) client: Arc<dyn ObjectGenerator>,
    pub(crate) signals: Arc<dyn SignalProvider>,
    resources: Arc<dyn Resources>,
    pages: Arc<dyn Pages>,
    env: Arc<HashMap<String, String>>,
    memory: Option<Arc<dyn MemoryProvider>>,
    options: Value,
    brain_run_id: String,
    pub(crate) emitter: Emitter,
}

impl Driver {
    fn from_params(params: RunParams, emitter: Emitter, brain_run_id: String) -> Self {
        Self {
            client: params.client,
            signals: params
                .signals
                .unwrap_or_else(|| Arc::new(QueueSignalProvider::new())),
            resources: params.resources.unwrap_or_else(|| Arc::new(NoopResources)),
            pages: params.pages.unwrap_or_else(|| Arc::new(NoopPages)),
            env: Arc::new(params.env),
            memory: params.memory,
            options: params.options,
            brain_run_id,
            emitter,
        }
    }

    /// Builds the context a body sees at the current state.
    pub(crate) fn step_context(&self, state: Value, response: Option<Value>) -> StepContext {
        StepContext {
            state,
            options: self.options.clone(),
            resources: Arc::clone(&self.resources),
            pages: Arc::clone(&self.pages),
            env: Arc::clone(&self.env),
            memory: self.memory.clone(),
            response,
            brain_run_id: self.brain_run_id.clone(),
        }
    }

    async fn drive_fresh(
        &mut self,
        def: &BrainDefinition,
        initial_state: Value,
    ) -> Result<(), StreamClosed> {
        self.emitter
            .emit(EventKind::Start {
                brain_title: def.title().to_string(),
                initial_state: initial_state.clone(),
                structure: def.structure(),
            })
            .await?;
        self.emitter.emit_step_status().await?;
        let outcome = self.run_level(def, 0, initial_state, 0, None).await?;
        self.finish(outcome).await
    }

    async fn drive_resumed(
        &mut self,
        def: &BrainDefinition,
        context: ResumeContext,
    ) -> Result<(), StreamClosed> {
        // RESUME signals queued before resume are consumed here
        while self
            .signals
            .take(&[SignalKind::Resume], true)
            .await
            .is_some()
        {}
        self.emitter.emit(EventKind::Resumed).await?;
        self.emitter.emit_step_status().await?;

        // a webhook suspension waits here for its response. Only
        // WEBHOOK_RESPONSE is drained: KILL, PAUSE, and user messages stay
        // queued and are observed at the next step or iteration boundary.
        let mut response = None;
        if context.awaits_webhook() {
            if let Some(Signal::WebhookResponse { response: value }) = self
                .signals
                .take(&[SignalKind::WebhookResponse], false)
                .await
            {
                response = Some(value);
            }
        }

        let state = context.state.clone();
        let start_index = context.step_index;
        let slot = LevelResume::from_context(context, response);
        let outcome = self.run_level(def, 0, state, start_index, slot).await?;
        self.finish(outcome).await
    }

    /// Emits the single terminal event for the run.
    async fn finish(&mut self, outcome: LevelOutcome) -> Result<(), StreamClosed> {
        match outcome {
            LevelOutcome::Completed(final_state) => {
                self.emitter
                    .emit(EventKind::Complete { final_state })
                    .await
            }
            LevelOutcome::Cancelled => self.emitter.emit(EventKind::Cancelled).await,
            LevelOutcome::Paused(context) => {
                self.emitter
                    .emit(EventKind::Paused {
                        resume_context: context.to_value(),
                    })
                    .await
            }
            LevelOutcome::Errored(error) => self.emitter.emit(EventKind::Error { error }).await,
        }
    }
}
