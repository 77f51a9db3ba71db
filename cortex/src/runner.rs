//! BrainRunner: convenience wrapper pumping a run's stream through adapters.
//!
//! Hosts that want the stream itself call [`engine::run`] directly; the
//! runner covers the common case of driving a brain to its terminal event
//! while a set of adapters observes every event in order.

use std::sync::Arc;

use brain_event::{BrainEvent, EventKind, SerializedError};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::adapter::{Adapter, AdapterFanout};
use crate::client::ObjectGenerator;
use crate::context::Resources;
use crate::definition::BrainDefinition;
use crate::engine::{self, ResumeParams, RunParams};
use crate::error::EngineError;
use crate::resume::ResumeContext;
use crate::signal::SignalProvider;

/// How a pumped run ended; mirrors the four terminal events.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    Complete { final_state: Value },
    Cancelled,
    Paused { resume_context: ResumeContext },
    Errored { error: SerializedError },
}

/// Drives brains to completion through a set of adapters.
pub struct BrainRunner {
    client: Arc<dyn ObjectGenerator>,
    adapters: Vec<Arc<dyn Adapter>>,
    resources: Option<Arc<dyn Resources>>,
}

impl BrainRunner {
    pub fn new(client: Arc<dyn ObjectGenerator>) -> Self {
        Self {
            client,
            adapters: Vec::new(),
            resources: None,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn Resources>) -> Self {
        self.resources = Some(resources);
        self
    }

    fn params(&self, options: Value, signals: Option<Arc<dyn SignalProvider>>) -> RunParams {
        let mut params = RunParams::new(Arc::clone(&self.client)).with_options(options);
        if let Some(resources) = &self.resources {
            params = params.with_resources(Arc::clone(resources));
        }
        if let Some(signals) = signals {
            params = params.with_signals(signals);
        }
        params
    }

    /// Runs a brain to its terminal event.
    pub async fn run(
        &self,
        def: &BrainDefinition,
        options: Value,
        signals: Option<Arc<dyn SignalProvider>>,
    ) -> Result<RunOutcome, EngineError> {
        let stream = engine::run(def, self.params(options, signals));
        self.pump(stream).await
    }

    /// Resumes a paused brain from its stored log and context.
    pub async fn resume(
        &self,
        def: &BrainDefinition,
        options: Value,
        signals: Option<Arc<dyn SignalProvider>>,
        event_log: Vec<BrainEvent>,
        resume_context: ResumeContext,
    ) -> Result<RunOutcome, EngineError> {
        let stream = engine::resume(
            def,
            ResumeParams {
                run: self.params(options, signals),
                event_log,
                resume_context,
            },
        );
        self.pump(stream).await
    }

    async fn pump(
        &self,
        mut stream: ReceiverStream<BrainEvent>,
    ) -> Result<RunOutcome, EngineError> {
        let fanout = AdapterFanout::new(self.adapters.clone());
        let mut outcome = None;
        while let Some(event) = stream.next().await {
            fanout.dispatch(&event).await;
            match &event.kind {
                EventKind::Complete { final_state } => {
                    outcome = Some(RunOutcome::Complete {
                        final_state: final_state.clone(),
                    });
                }
                EventKind::Cancelled => outcome = Some(RunOutcome::Cancelled),
                EventKind::Paused { resume_context } => {
                    outcome = Some(RunOutcome::Paused {
                        resume_context: ResumeContext::from_value(resume_context)?,
                    });
                }
                EventKind::Error { error } => {
                    outcome = Some(RunOutcome::Errored {
                        error: error.clone(),
                    });
                }
                _ => {}
            }
        }
        outcome.ok_or(EngineError::StreamTruncated)
    }
}
