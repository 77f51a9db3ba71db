//! Main step scheduler: drives one brain level step by step.
//!
//! Signals are checked before each step, never mid-step; a step that has
//! begun always runs to its natural suspension point (completion, webhook,
//! or an agent-iteration boundary). Nested brains recurse through the same
//! loop one depth deeper; terminal events are only ever emitted by the
//! outermost driver, so KILL unwinds the whole stack into one `CANCELLED`
//! and PAUSE into one `PAUSED` whose context chains every open level.

use brain_event::{EventKind, WebhookRegistration};
use futures_util::future::BoxFuture;
use json_patch::Patch;
use serde_json::Value;

use crate::definition::{BrainDefinition, StepDef};
use crate::error::StepFailure;
use crate::patch;
use crate::resume::{AgentResumeState, BatchProgress, ResumeContext, WebhookResume};
use crate::signal::{Signal, SignalKind};

use super::agent_loop::AgentStepOutcome;
use super::batch::BatchStepOutcome;
use super::{Driver, StreamClosed};

/// Outcome of running one brain level. Terminal events are emitted by the
/// caller at the outermost level only.
pub(crate) enum LevelOutcome {
    /// The level ran to its end (or a step halted it early) with this state.
    Completed(Value),
    Cancelled,
    Paused(ResumeContext),
    Errored(brain_event::SerializedError),
}

/// Interior resume slot for the first step executed after resume.
pub(crate) enum LevelResume {
    /// Resume descends into a nested child level.
    Nested(Box<ResumeContext>, Option<Value>),
    /// Resume re-enters an agent loop, optionally delivering a webhook
    /// response as the pending tool result.
    Agent(AgentResumeState, Option<Value>),
    /// Resume re-executes a plain step with the webhook response injected.
    PlainWebhook(Option<Value>),
    /// Resume restarts a batch at the first unprocessed item.
    Batch(BatchProgress),
}

impl LevelResume {
    /// Maps a context's interior branch to the slot for its level, threading
    /// the drained webhook response to the suspension point.
    pub(crate) fn from_context(
        context: ResumeContext,
        response: Option<Value>,
    ) -> Option<LevelResume> {
        if let Some(inner) = context.inner {
            Some(LevelResume::Nested(inner, response))
        } else if let Some(agent) = context.agent {
            Some(LevelResume::Agent(agent, response))
        } else if context.webhook.is_some() {
            Some(LevelResume::PlainWebhook(response))
        } else {
            context.batch.map(LevelResume::Batch)
        }
    }
}

impl Driver {
    /// Boxed recursion point for nested levels.
    pub(crate) fn run_level_boxed<'a>(
        &'a mut self,
        def: &'a BrainDefinition,
        depth: usize,
        state: Value,
        start_index: usize,
        resume: Option<LevelResume>,
    ) -> BoxFuture<'a, Result<LevelOutcome, StreamClosed>> {
        Box::pin(self.run_level(def, depth, state, start_index, resume))
    }

    /// Runs one level from `start_index` until completion, suspension, or a
    /// terminal outcome.
    pub(crate) async fn run_level(
        &mut self,
        def: &BrainDefinition,
        depth: usize,
        mut state: Value,
        start_index: usize,
        mut resume: Option<LevelResume>,
    ) -> Result<LevelOutcome, StreamClosed> {
        let steps = def.steps();
        let mut i = start_index;
        loop {
            match self
                .signals
                .take(&[SignalKind::Kill, SignalKind::Pause], true)
                .await
            {
                Some(Signal::Kill) => return Ok(LevelOutcome::Cancelled),
                Some(Signal::Pause) => {
                    return Ok(LevelOutcome::Paused(ResumeContext::at_step(i, state)))
                }
                _ => {}
            }
            if i >= steps.len() {
                return Ok(LevelOutcome::Completed(state));
            }

            let step = &steps[i];
            let slot = resume.take();

            match step {
                StepDef::Plain { title, body } => {
                    let (resumed, response) = match slot {
                        Some(LevelResume::PlainWebhook(response)) => (true, response),
                        _ => (false, None),
                    };
                    if !resumed {
                        self.emit_step_start(def, depth, i, step, None).await?;
                    } else if let Some(value) = response.clone() {
                        self.emitter
                            .emit(EventKind::WebhookResponse { response: value })
                            .await?;
                    }
                    let ctx = self.step_context(state.clone(), response);
                    match (body)(ctx).await {
                        Ok(ret) => {
                            if !ret.webhooks.is_empty() {
                                return self.suspend_on_webhooks(i, state, ret.webhooks).await;
                            }
                            let halted = ret.halt;
                            self.complete_step(def, depth, i, title, &state, &ret.state, halted)
                                .await?;
                            state = ret.state;
                            if halted {
                                return Ok(LevelOutcome::Completed(state));
                            }
                            i += 1;
                        }
                        Err(failure) => return Ok(self.errored(failure)),
                    }
                }

                StepDef::Agent { title, body } => {
                    let agent_resume = match slot {
                        Some(LevelResume::Agent(saved, response)) => Some((saved, response)),
                        _ => None,
                    };
                    if agent_resume.is_none() {
                        self.emit_step_start(def, depth, i, step, None).await?;
                    }
                    match self.run_agent_step(title, body, &state, agent_resume).await? {
                        AgentStepOutcome::Completed(result) => {
                            self.complete_step(def, depth, i, title, &state, &result, false)
                                .await?;
                            state = result;
                            i += 1;
                        }
                        AgentStepOutcome::Cancelled => return Ok(LevelOutcome::Cancelled),
                        AgentStepOutcome::Paused(agent) => {
                            return Ok(LevelOutcome::Paused(
                                ResumeContext::at_step(i, state).with_agent(agent),
                            ));
                        }
                        AgentStepOutcome::Webhook { agent, wait_for } => {
                            self.emitter
                                .emit(EventKind::Webhook { wait_for })
                                .await?;
                            return Ok(LevelOutcome::Paused(
                                ResumeContext::at_step(i, state).with_agent(agent),
                            ));
                        }
                        AgentStepOutcome::Failed(error) => {
                            return Ok(LevelOutcome::Errored(error))
                        }
                    }
                }

                StepDef::NestedBrain {
                    title,
                    child,
                    adapt_state,
                    merge_state,
                } => {
                    let (child_state, child_start, child_slot) = match slot {
                        Some(LevelResume::Nested(inner, response)) => {
                            let inner = *inner;
                            let child_state = inner.state.clone();
                            let child_start = inner.step_index;
                            let child_slot = LevelResume::from_context(inner, response);
                            (child_state, child_start, child_slot)
                        }
                        _ => {
                            let adapted = (adapt_state)(&state);
                            self.emit_step_start(def, depth, i, step, Some(adapted.clone()))
                                .await?;
                            (adapted, 0, None)
                        }
                    };
                    let outcome = self
                        .run_level_boxed(child.as_ref(), depth + 1, child_state, child_start, child_slot)
                        .await?;
                    match outcome {
                        LevelOutcome::Completed(child_final) => {
                            let merged = (merge_state)(&state, &child_final);
                            self.complete_step(def, depth, i, title, &state, &merged, false)
                                .await?;
                            state = merged;
                            i += 1;
                        }
                        LevelOutcome::Cancelled => return Ok(LevelOutcome::Cancelled),
                        LevelOutcome::Paused(child_context) => {
                            return Ok(LevelOutcome::Paused(
                                ResumeContext::at_step(i, state).with_inner(child_context),
                            ));
                        }
                        LevelOutcome::Errored(error) => return Ok(LevelOutcome::Errored(error)),
                    }
                }

                StepDef::BatchAgent {
                    title,
                    items,
                    chunk_size,
                    schema,
                    body,
                } => {
                    let batch_resume = match slot {
                        Some(LevelResume::Batch(progress)) => Some(progress),
                        _ => None,
                    };
                    if batch_resume.is_none() {
                        self.emit_step_start(def, depth, i, step, None).await?;
                    }
                    let outcome = self
                        .run_batch_step(
                            title,
                            items,
                            *chunk_size,
                            schema.as_ref(),
                            body,
                            &state,
                            batch_resume,
                        )
                        .await?;
                    match outcome {
                        BatchStepOutcome::Completed(result) => {
                            self.complete_step(def, depth, i, title, &state, &result, false)
                                .await?;
                            state = result;
                            i += 1;
                        }
                        BatchStepOutcome::Cancelled => return Ok(LevelOutcome::Cancelled),
                        BatchStepOutcome::Paused(progress) => {
                            return Ok(LevelOutcome::Paused(
                                ResumeContext::at_step(i, state).with_batch(progress),
                            ));
                        }
                        BatchStepOutcome::Failed(error) => {
                            return Ok(LevelOutcome::Errored(error))
                        }
                    }
                }
            }
        }
    }

    async fn suspend_on_webhooks(
        &mut self,
        step_index: usize,
        state: Value,
        wait_for: Vec<WebhookRegistration>,
    ) -> Result<LevelOutcome, StreamClosed> {
        self.emitter
            .emit(EventKind::Webhook {
                wait_for: wait_for.clone(),
            })
            .await?;
        Ok(LevelOutcome::Paused(
            ResumeContext::at_step(step_index, state).with_webhook(WebhookResume { wait_for }),
        ))
    }

    fn errored(&self, failure: StepFailure) -> LevelOutcome {
        tracing::debug!(error = %failure, "step body failed");
        LevelOutcome::Errored(failure.serialized())
    }

    async fn emit_step_start(
        &mut self,
        def: &BrainDefinition,
        depth: usize,
        step_index: usize,
        step: &StepDef,
        child_initial_state: Option<Value>,
    ) -> Result<(), StreamClosed> {
        let child_brain_title = match step {
            StepDef::NestedBrain { child, .. } => Some(child.title().to_string()),
            _ => None,
        };
        self.emitter
            .emit(EventKind::StepStart {
                brain_title: def.title().to_string(),
                depth,
                step_index,
                step_title: step.title().to_string(),
                step_type: step.step_type(),
                child_brain_title,
                child_initial_state,
            })
            .await
    }

    /// Emits `STEP_COMPLETE` with the forward patch plus a `STEP_STATUS`
    /// snapshot (the boundary cadence).
    async fn complete_step(
        &mut self,
        def: &BrainDefinition,
        depth: usize,
        step_index: usize,
        step_title: &str,
        old_state: &Value,
        new_state: &Value,
        halted: bool,
    ) -> Result<(), StreamClosed> {
        let step_patch: Patch = patch::diff(old_state, new_state);
        self.emitter
            .emit(EventKind::StepComplete {
                brain_title: def.title().to_string(),
                depth,
                step_index,
                step_title: step_title.to_string(),
                patch: step_patch,
                halted,
            })
            .await?;
        self.emitter.emit_step_status().await
    }
}
