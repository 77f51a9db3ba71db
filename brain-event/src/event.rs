//! Event union for one brain run: type + payload under a shared envelope.
//!
//! Every event is serializable to canonical JSON (sorted keys, the wire form
//! stored by hosts and replayed on resume). `STEP_COMPLETE.patch` is the raw
//! RFC-6902 array produced by the engine's patch module. Agent raw response
//! messages keep provider metadata as an opaque JSON blob.

use chrono::{DateTime, Utc};
use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::SerializedStep;
use crate::structure::{BrainStructure, StepType};

/// Error from decoding a stored wire event.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WireError {
    #[error("event decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A user-facing error serialized into `ERROR` events: name, message, and an
/// optional stack/backtrace rendering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl SerializedError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }
}

/// A webhook registration a step or tool waits on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WebhookRegistration {
    pub slug: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub schema: Value,
}

/// One item result inside a `BATCH_CHUNK_COMPLETE` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub result: Value,
}

/// Tagged event payload. The tag value is the event kind name on the wire
/// (`START`, `STEP_COMPLETE`, `AGENT_ITERATION`, ...).
///
/// Step-scoped events carry the owning level's `brain_title` and stack
/// `depth` (0 = outermost) so a stored log can be replayed into the same
/// execution stack the engine held. A nested-brain `STEP_START` additionally
/// carries the child's title and adapted initial state; child-level events
/// then arrive at `depth + 1`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    // --- Lifecycle ---
    Start {
        brain_title: String,
        initial_state: Value,
        structure: BrainStructure,
    },
    Complete {
        final_state: Value,
    },
    Error {
        error: SerializedError,
    },
    Cancelled,
    Paused {
        /// Serialized `ResumeContext` tree; hosts persist it for `resume`.
        resume_context: Value,
    },
    Resumed,

    // --- Step ---
    StepStatus {
        steps: Vec<SerializedStep>,
    },
    StepStart {
        brain_title: String,
        depth: usize,
        step_index: usize,
        step_title: String,
        step_type: StepType,
        #[serde(skip_serializing_if = "Option::is_none")]
        child_brain_title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        child_initial_state: Option<Value>,
    },
    StepComplete {
        brain_title: String,
        depth: usize,
        step_index: usize,
        step_title: String,
        patch: Patch,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        halted: bool,
    },

    // --- Agent ---
    AgentStart {
        step_title: String,
        prompt: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        system: Option<String>,
    },
    AgentIteration {
        iteration: u32,
        total_tokens: u64,
    },
    AgentToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    AgentToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
    },
    AgentAssistantMessage {
        content: String,
    },
    AgentRawResponseMessage {
        /// Provider response message, kept opaque.
        message: Value,
    },
    AgentUserMessage {
        content: String,
    },
    AgentComplete {
        result: Value,
        terminal_tool_name: String,
    },
    AgentTokenLimit {
        total_tokens: u64,
        max_tokens: u64,
    },
    AgentIterationLimit {
        iteration: u32,
        max_iterations: u32,
    },
    AgentWebhook {
        wait_for: Vec<WebhookRegistration>,
        tool_call_id: String,
        tool_name: String,
    },

    // --- Batch ---
    BatchChunkComplete {
        step_title: String,
        results: Vec<BatchItemResult>,
        processed: usize,
        total: usize,
    },

    // --- External ---
    Webhook {
        wait_for: Vec<WebhookRegistration>,
    },
    WebhookResponse {
        response: Value,
    },
}

impl EventKind {
    /// Wire tag of this event kind (`"STEP_COMPLETE"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Start { .. } => "START",
            EventKind::Complete { .. } => "COMPLETE",
            EventKind::Error { .. } => "ERROR",
            EventKind::Cancelled => "CANCELLED",
            EventKind::Paused { .. } => "PAUSED",
            EventKind::Resumed => "RESUMED",
            EventKind::StepStatus { .. } => "STEP_STATUS",
            EventKind::StepStart { .. } => "STEP_START",
            EventKind::StepComplete { .. } => "STEP_COMPLETE",
            EventKind::AgentStart { .. } => "AGENT_START",
            EventKind::AgentIteration { .. } => "AGENT_ITERATION",
            EventKind::AgentToolCall { .. } => "AGENT_TOOL_CALL",
            EventKind::AgentToolResult { .. } => "AGENT_TOOL_RESULT",
            EventKind::AgentAssistantMessage { .. } => "AGENT_ASSISTANT_MESSAGE",
            EventKind::AgentRawResponseMessage { .. } => "AGENT_RAW_RESPONSE_MESSAGE",
            EventKind::AgentUserMessage { .. } => "AGENT_USER_MESSAGE",
            EventKind::AgentComplete { .. } => "AGENT_COMPLETE",
            EventKind::AgentTokenLimit { .. } => "AGENT_TOKEN_LIMIT",
            EventKind::AgentIterationLimit { .. } => "AGENT_ITERATION_LIMIT",
            EventKind::AgentWebhook { .. } => "AGENT_WEBHOOK",
            EventKind::BatchChunkComplete { .. } => "BATCH_CHUNK_COMPLETE",
            EventKind::Webhook { .. } => "WEBHOOK",
            EventKind::WebhookResponse { .. } => "WEBHOOK_RESPONSE",
        }
    }

    /// True for the four terminal kinds that close a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::Complete { .. }
                | EventKind::Error { .. }
                | EventKind::Cancelled
                | EventKind::Paused { .. }
        )
    }
}

/// One emitted event: envelope fields plus the tagged payload.
///
/// `seq` is strictly increasing per run (resume continues after the stored
/// log's last seq); `ts` is monotone non-decreasing. Consumers must treat an
/// event as frozen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrainEvent {
    pub brain_run_id: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,
    pub seq: u64,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl BrainEvent {
    /// Serializes to the canonical wire form: one JSON object, keys sorted.
    ///
    /// `serde_json`'s default object representation is BTreeMap-backed, so
    /// values produced here always have sorted keys.
    pub fn to_canonical_json(&self) -> Result<String, WireError> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string(&value)?)
    }

    /// Decodes one stored wire event.
    pub fn from_json(raw: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(raw)?)
    }
}
