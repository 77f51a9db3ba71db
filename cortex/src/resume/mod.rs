//! Resume contexts and stored-log validation.
//!
//! A [`ResumeContext`] is the snapshot of where a paused run picks up:
//! one node per execution-stack level, with exactly one interior branch
//! (`inner`, `agent`, `webhook`, `batch`) set at the deepest node. The engine
//! builds it at pause time and carries it on the `PAUSED` event; hosts persist
//! it together with the event log and hand both back to `resume`.
//!
//! Validation: a stored log must begin with `START` and contain no terminal
//! event except a trailing `PAUSED`. Replaying the log through the reducer
//! must agree with the provided context on per-level state and step index;
//! disagreement is an engine-internal error, never a step error.

use brain_event::{BatchItemResult, BrainEvent, EventKind, WebhookRegistration};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::{ChatMessage, ToolCallRequest};
use crate::error::EngineError;
use crate::reducer::RunReduction;

/// Mid-agent snapshot: conversation, counters, and any webhook wait.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentResumeState {
    pub iteration: u32,
    pub total_tokens: u64,
    pub messages: Vec<ChatMessage>,
    /// The tool call whose result the run is waiting on (webhook suspension).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_tool_call: Option<ToolCallRequest>,
    /// Tool calls from the same LLM response not yet dispatched when the
    /// webhook suspended the loop; they run after the response is delivered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remaining_tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wait_for: Vec<WebhookRegistration>,
}

/// A plain step suspended on webhooks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookResume {
    pub wait_for: Vec<WebhookRegistration>,
}

/// Mid-batch snapshot. `processed` counts fully completed items; resume
/// restarts at that index. `items` is the captured work list; when absent
/// (contexts derived purely from a log), the items body is re-evaluated on
/// resume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Value>,
    pub processed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<BatchItemResult>,
}

/// Where a paused or suspended run picks up, one node per stack level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResumeContext {
    pub step_index: usize,
    pub state: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<ResumeContext>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentResumeState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookResume>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchProgress>,
}

impl ResumeContext {
    /// Boundary pause: the step at `step_index` has not started.
    pub fn at_step(step_index: usize, state: Value) -> Self {
        Self {
            step_index,
            state,
            inner: None,
            agent: None,
            webhook: None,
            batch: None,
        }
    }

    pub fn with_inner(mut self, inner: ResumeContext) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    pub fn with_agent(mut self, agent: AgentResumeState) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_webhook(mut self, webhook: WebhookResume) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn with_batch(mut self, batch: BatchProgress) -> Self {
        self.batch = Some(batch);
        self
    }

    /// The deepest node of the chain (the interior suspension point).
    pub fn deepest(&self) -> &ResumeContext {
        match &self.inner {
            Some(inner) => inner.deepest(),
            None => self,
        }
    }

    /// True when the suspension point waits on webhooks (plain step or
    /// mid-agent tool wait).
    pub fn awaits_webhook(&self) -> bool {
        let deepest = self.deepest();
        deepest.webhook.is_some()
            || deepest
                .agent
                .as_ref()
                .map(|a| !a.wait_for.is_empty())
                .unwrap_or(false)
    }

    /// Serialized form carried on `PAUSED` events.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: &Value) -> Result<Self, EngineError> {
        serde_json::from_value(value.clone())
            .map_err(|e| EngineError::Internal(format!("resume context decode: {}", e)))
    }
}

/// Validates a stored event log per the resume protocol.
pub fn validate_log(log: &[BrainEvent]) -> Result<(), EngineError> {
    let first = log
        .first()
        .ok_or_else(|| EngineError::Internal("event log is empty".into()))?;
    if !matches!(first.kind, EventKind::Start { .. }) {
        return Err(EngineError::Internal(format!(
            "event log must begin with START, found {}",
            first.kind.name()
        )));
    }
    for (i, event) in log.iter().enumerate() {
        if event.kind.is_terminal() {
            let is_trailing_pause =
                i + 1 == log.len() && matches!(event.kind, EventKind::Paused { .. });
            if !is_trailing_pause {
                return Err(EngineError::Internal(format!(
                    "event log contains terminal {} at position {}",
                    event.kind.name(),
                    i
                )));
            }
        }
    }
    Ok(())
}

/// Checks that a replayed reduction agrees with the provided context on
/// per-level state and step index.
pub fn check_agreement(
    reduction: &RunReduction,
    context: &ResumeContext,
) -> Result<(), EngineError> {
    let mut node = Some(context);
    let mut depth = 0usize;
    while let Some(ctx) = node {
        let frame = reduction.frames.get(depth).ok_or_else(|| {
            EngineError::Internal(format!(
                "resume context has {} levels but replay produced {}",
                depth + 1,
                reduction.frames.len()
            ))
        })?;
        if frame.step_index != ctx.step_index {
            return Err(EngineError::Internal(format!(
                "replay disagreement at depth {}: step index {} vs {}",
                depth, frame.step_index, ctx.step_index
            )));
        }
        if frame.state != ctx.state {
            return Err(EngineError::Internal(format!(
                "replay disagreement at depth {}: state mismatch",
                depth
            )));
        }
        node = ctx.inner.as_deref();
        depth += 1;
    }
    Ok(())
}
