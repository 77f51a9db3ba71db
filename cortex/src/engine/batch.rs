//! Batch agent steps: an item list fanned through the agent loop in chunks.
//!
//! Items run in order, one agent loop each; `BATCH_CHUNK_COMPLETE` carries
//! the accumulated `(index, result)` pairs after every chunk. Signals are
//! checked between items: PAUSE captures `processed` and the partial results
//! so resume restarts at the first unprocessed item (a mid-item pause
//! restarts that item). The step's result state is the ordered array of item
//! results. Webhook waits inside batch items are not supported and fail the
//! step.

use brain_event::{BatchItemResult, EventKind, SerializedError};
use serde_json::Value;

use crate::definition::{validate_against, BatchBodyFn, BatchItemsFn};
use crate::resume::BatchProgress;
use crate::signal::{Signal, SignalKind};

use super::agent_loop::AgentStepOutcome;
use super::{Driver, StreamClosed};

/// Outcome of one batch step.
pub(crate) enum BatchStepOutcome {
    /// All items processed; the result array is the step state.
    Completed(Value),
    Cancelled,
    Paused(BatchProgress),
    Failed(SerializedError),
}

impl Driver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn run_batch_step(
        &mut self,
        title: &str,
        items_fn: &BatchItemsFn,
        chunk_size: usize,
        schema: Option<&Value>,
        body: &BatchBodyFn,
        state: &Value,
        resume: Option<BatchProgress>,
    ) -> Result<BatchStepOutcome, StreamClosed> {
        let (items, mut results, start) = match resume {
            Some(progress) => {
                let items = if progress.items.is_empty() {
                    // contexts derived purely from a log carry no items; the
                    // items body is deterministic enough to re-evaluate
                    match (items_fn)(self.step_context(state.clone(), None)).await {
                        Ok(items) => items,
                        Err(failure) => {
                            return Ok(BatchStepOutcome::Failed(failure.serialized()))
                        }
                    }
                } else {
                    progress.items
                };
                (items, progress.results, progress.processed)
            }
            None => match (items_fn)(self.step_context(state.clone(), None)).await {
                Ok(items) => (items, Vec::new(), 0),
                Err(failure) => return Ok(BatchStepOutcome::Failed(failure.serialized())),
            },
        };

        let total = items.len();
        for index in start..total {
            match self
                .signals
                .take(&[SignalKind::Kill, SignalKind::Pause], true)
                .await
            {
                Some(Signal::Kill) => return Ok(BatchStepOutcome::Cancelled),
                Some(Signal::Pause) => {
                    return Ok(BatchStepOutcome::Paused(BatchProgress {
                        items,
                        processed: index,
                        results,
                    }));
                }
                _ => {}
            }

            let item = items[index].clone();
            let spec = match (body)(item, self.step_context(state.clone(), None)).await {
                Ok(spec) => spec,
                Err(failure) => return Ok(BatchStepOutcome::Failed(failure.serialized())),
            };

            match self.run_agent_loop(title, &spec, state, None).await? {
                AgentStepOutcome::Completed(result) => {
                    if let Some(schema) = schema {
                        if let Err(failure) = validate_against(schema, &result, "batch item result")
                        {
                            return Ok(BatchStepOutcome::Failed(failure.serialized()));
                        }
                    }
                    results.push(BatchItemResult { index, result });
                }
                AgentStepOutcome::Cancelled => return Ok(BatchStepOutcome::Cancelled),
                AgentStepOutcome::Paused(_) => {
                    // the item restarts on resume; only whole items count
                    return Ok(BatchStepOutcome::Paused(BatchProgress {
                        items,
                        processed: index,
                        results,
                    }));
                }
                AgentStepOutcome::Webhook { .. } => {
                    return Ok(BatchStepOutcome::Failed(SerializedError::new(
                        "UnsupportedWebhook",
                        "webhook waits are not supported inside batch items",
                    )));
                }
                AgentStepOutcome::Failed(error) => return Ok(BatchStepOutcome::Failed(error)),
            }

            let processed = index + 1;
            if processed % chunk_size == 0 || processed == total {
                self.emitter
                    .emit(EventKind::BatchChunkComplete {
                        step_title: title.to_string(),
                        results: results.clone(),
                        processed,
                        total,
                    })
                    .await?;
            }
        }

        let final_state = Value::Array(results.iter().map(|r| r.result.clone()).collect());
        Ok(BatchStepOutcome::Completed(final_state))
    }
}
