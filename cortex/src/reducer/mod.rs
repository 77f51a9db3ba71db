//! Pure reduction from an event sequence to engine context.
//!
//! [`reduce`] folds one event into a [`RunReduction`]: the execution stack
//! (one frame per brain level, outer → inner), the deepest level's agent and
//! batch context, the serialized step tree, and terminal flags. The running
//! engine reduces live to keep the tree it emits as `STEP_STATUS`; resume
//! replays a stored log through the same function to reconstruct the context
//! the engine held when it paused. Replay is O(|events|): patches apply in
//! place on the owning frame and tree nodes update by path.

use brain_event::{
    BatchItemResult, BrainEvent, EventKind, SerializedStep, StepExecutionStatus, StepType,
    WebhookRegistration,
};
use serde_json::Value;

use crate::client::{ChatMessage, ToolCallRequest};
use crate::error::EngineError;
use crate::patch;
use crate::resume::{AgentResumeState, BatchProgress, ResumeContext, WebhookResume};

/// One execution-stack frame: a brain level and its position.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub brain_title: String,
    /// Index of the running step, or of the next step once it completes.
    pub step_index: usize,
    pub state: Value,
}

/// Agent context rebuilt from agent events.
///
/// The conversation is reconstructed from `AGENT_ASSISTANT_MESSAGE`,
/// `AGENT_TOOL_CALL`, `AGENT_TOOL_RESULT`, and `AGENT_USER_MESSAGE`: an
/// assistant message stays open while its tool calls attach, and closes at
/// the next iteration boundary, preserving the engine's append order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AgentReduction {
    pub iteration: u32,
    pub total_tokens: u64,
    messages: Vec<ChatMessage>,
    open_assistant: Option<ChatMessage>,
    open_tool_results: Vec<ChatMessage>,
    pub pending_tool_call: Option<ToolCallRequest>,
    pub wait_for: Vec<WebhookRegistration>,
}

impl AgentReduction {
    fn close_open(&mut self) {
        if let Some(assistant) = self.open_assistant.take() {
            self.messages.push(assistant);
        }
        self.messages.append(&mut self.open_tool_results);
    }

    /// The conversation with any open assistant/tool messages folded in.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        let mut snapshot = self.clone();
        snapshot.close_open();
        snapshot.messages
    }
}

/// Batch context rebuilt from `BATCH_CHUNK_COMPLETE` events.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReduction {
    pub processed: usize,
    pub results: Vec<BatchItemResult>,
}

/// Full reduced context for one run.
#[derive(Clone, Debug, Default)]
pub struct RunReduction {
    pub frames: Vec<Frame>,
    pub agent: Option<AgentReduction>,
    pub batch: Option<BatchReduction>,
    pub step_tree: Vec<SerializedStep>,
    pub waiting_webhooks: Vec<WebhookRegistration>,
    pub is_complete: bool,
    pub is_killed: bool,
    pub is_paused: bool,
    pub is_errored: bool,
    pub started: bool,
    pub last_seq: u64,
}

impl RunReduction {
    /// Locates the tree node for (`depth`, `step_index`) using the current
    /// frames as the path through nested levels.
    fn node_mut(&mut self, depth: usize, step_index: usize) -> Option<&mut SerializedStep> {
        let mut steps = &mut self.step_tree;
        for level in 0..depth {
            let parent_index = self.frames.get(level)?.step_index;
            steps = steps.get_mut(parent_index)?.inner_steps.as_mut()?;
        }
        steps.get_mut(step_index)
    }

    fn retag_running(&mut self, to: StepExecutionStatus) {
        retag(&mut self.step_tree, StepExecutionStatus::Running, to);
    }

    /// Derives a resume context from the reduced frames: per-level state and
    /// step index, with the deepest node's interior branch taken from the
    /// agent, webhook, or batch context. Batch items are not recoverable from
    /// a log, so a derived batch branch re-evaluates the items body on resume.
    pub fn resume_context(&self) -> Option<ResumeContext> {
        let deepest = self.frames.len().checked_sub(1)?;
        let mut node: Option<ResumeContext> = None;
        for (depth, frame) in self.frames.iter().enumerate().rev() {
            let mut ctx = ResumeContext::at_step(frame.step_index, frame.state.clone());
            if depth == deepest {
                if let Some(agent) = &self.agent {
                    ctx = ctx.with_agent(AgentResumeState {
                        iteration: agent.iteration,
                        total_tokens: agent.total_tokens,
                        messages: agent.conversation(),
                        pending_tool_call: agent.pending_tool_call.clone(),
                        remaining_tool_calls: Vec::new(),
                        wait_for: agent.wait_for.clone(),
                    });
                } else if !self.waiting_webhooks.is_empty() {
                    ctx = ctx.with_webhook(WebhookResume {
                        wait_for: self.waiting_webhooks.clone(),
                    });
                } else if let Some(batch) = &self.batch {
                    ctx = ctx.with_batch(BatchProgress {
                        items: Vec::new(),
                        processed: batch.processed,
                        results: batch.results.clone(),
                    });
                }
            }
            if let Some(inner) = node.take() {
                ctx = ctx.with_inner(inner);
            }
            node = Some(ctx);
        }
        node
    }
}

fn retag(steps: &mut [SerializedStep], from: StepExecutionStatus, to: StepExecutionStatus) {
    for step in steps {
        if step.status == from {
            step.status = to;
        }
        if let Some(inner) = step.inner_steps.as_mut() {
            retag(inner, from, to);
        }
    }
}

/// Folds one event into the reduction.
///
/// Fails only on internally inconsistent input (a stored patch that does not
/// apply), which resume treats as a corrupt log.
pub fn reduce(r: &mut RunReduction, event: &BrainEvent) -> Result<(), EngineError> {
    r.last_seq = event.seq;
    match &event.kind {
        EventKind::Start {
            brain_title,
            initial_state,
            structure,
        } => {
            r.started = true;
            r.frames = vec![Frame {
                brain_title: brain_title.clone(),
                step_index: 0,
                state: initial_state.clone(),
            }];
            r.step_tree = SerializedStep::pending_tree(structure);
        }

        EventKind::StepStart {
            depth,
            step_index,
            step_title,
            step_type,
            child_brain_title,
            child_initial_state,
            ..
        } => {
            r.frames.truncate(depth + 1);
            if let Some(frame) = r.frames.get_mut(*depth) {
                frame.step_index = *step_index;
            }
            if let Some(node) = r.node_mut(*depth, *step_index) {
                node.status = StepExecutionStatus::Running;
            }
            if *step_type == StepType::Brain {
                r.frames.push(Frame {
                    brain_title: child_brain_title
                        .clone()
                        .unwrap_or_else(|| step_title.clone()),
                    step_index: 0,
                    state: child_initial_state.clone().unwrap_or(Value::Null),
                });
            }
            r.agent = None;
            r.batch = None;
        }

        EventKind::StepComplete {
            depth,
            step_index,
            patch: step_patch,
            ..
        } => {
            r.frames.truncate(depth + 1);
            if let Some(frame) = r.frames.get_mut(*depth) {
                frame.state = patch::apply(&frame.state, step_patch)
                    .map_err(|e| EngineError::Internal(format!("stored patch: {}", e)))?;
                frame.step_index = step_index + 1;
            }
            if let Some(node) = r.node_mut(*depth, *step_index) {
                node.status = StepExecutionStatus::Complete;
                node.patch = Some(step_patch.clone());
            }
            r.agent = None;
            r.batch = None;
            r.waiting_webhooks.clear();
        }

        EventKind::StepStatus { steps } => {
            r.step_tree = steps.clone();
        }

        EventKind::AgentStart { prompt, .. } => {
            r.agent = Some(AgentReduction {
                messages: vec![ChatMessage::user(prompt.clone())],
                ..AgentReduction::default()
            });
        }
        EventKind::AgentIteration {
            iteration,
            total_tokens,
        } => {
            if let Some(agent) = r.agent.as_mut() {
                agent.close_open();
                agent.iteration = *iteration;
                agent.total_tokens = *total_tokens;
            }
        }
        EventKind::AgentUserMessage { content } => {
            if let Some(agent) = r.agent.as_mut() {
                agent.close_open();
                agent.messages.push(ChatMessage::user(content.clone()));
            }
        }
        EventKind::AgentAssistantMessage { content } => {
            if let Some(agent) = r.agent.as_mut() {
                agent.close_open();
                agent.open_assistant = Some(ChatMessage::assistant(content.clone(), Vec::new()));
            }
        }
        EventKind::AgentToolCall {
            tool_call_id,
            tool_name,
            input,
        } => {
            if let Some(agent) = r.agent.as_mut() {
                let call = ToolCallRequest {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    args: input.clone(),
                };
                agent
                    .open_assistant
                    .get_or_insert_with(|| ChatMessage::assistant("", Vec::new()))
                    .tool_calls
                    .push(call.clone());
                agent.pending_tool_call = Some(call);
            }
        }
        EventKind::AgentToolResult {
            tool_call_id,
            result,
            ..
        } => {
            if let Some(agent) = r.agent.as_mut() {
                agent
                    .open_tool_results
                    .push(ChatMessage::tool_result(tool_call_id.clone(), result));
                agent.pending_tool_call = None;
            }
        }
        EventKind::AgentRawResponseMessage { .. } => {
            // provider blobs are opaque; the canonical conversation is rebuilt
            // from the typed agent events
        }
        EventKind::AgentWebhook { wait_for, .. } => {
            if let Some(agent) = r.agent.as_mut() {
                agent.close_open();
                agent.wait_for = wait_for.clone();
            }
        }
        EventKind::AgentComplete { .. } => {
            r.agent = None;
        }
        EventKind::AgentTokenLimit { total_tokens, .. } => {
            if let Some(agent) = r.agent.as_mut() {
                agent.close_open();
                agent.total_tokens = *total_tokens;
            }
        }
        EventKind::AgentIterationLimit { .. } => {
            if let Some(agent) = r.agent.as_mut() {
                agent.close_open();
            }
        }

        EventKind::BatchChunkComplete {
            results, processed, ..
        } => {
            r.batch = Some(BatchReduction {
                processed: *processed,
                results: results.clone(),
            });
        }

        EventKind::Webhook { wait_for } => {
            r.waiting_webhooks = wait_for.clone();
        }
        EventKind::WebhookResponse { .. } => {
            r.waiting_webhooks.clear();
        }

        EventKind::Complete { .. } => {
            r.is_complete = true;
        }
        EventKind::Error { .. } => {
            r.is_errored = true;
            r.retag_running(StepExecutionStatus::Error);
        }
        EventKind::Cancelled => {
            r.is_killed = true;
            r.retag_running(StepExecutionStatus::Cancelled);
        }
        EventKind::Paused { .. } => {
            r.is_paused = true;
            r.retag_running(StepExecutionStatus::Paused);
        }
        EventKind::Resumed => {
            r.is_paused = false;
            retag(
                &mut r.step_tree,
                StepExecutionStatus::Paused,
                StepExecutionStatus::Running,
            );
        }
    }
    Ok(())
}

/// Replays a stored log into a fresh reduction.
pub fn replay(log: &[BrainEvent]) -> Result<RunReduction, EngineError> {
    let mut reduction = RunReduction::default();
    for event in log {
        reduce(&mut reduction, event)?;
    }
    Ok(reduction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_event::{BrainStructure, EnvelopeState, StepNode};
    use serde_json::json;

    fn structure(titles: &[&str]) -> BrainStructure {
        BrainStructure {
            title: "b".into(),
            description: None,
            steps: titles
                .iter()
                .map(|t| StepNode {
                    step_type: StepType::Plain,
                    title: (*t).to_string(),
                    inner: None,
                })
                .collect(),
        }
    }

    fn wrap_all(kinds: Vec<EventKind>) -> Vec<BrainEvent> {
        let mut env = EnvelopeState::new("run-1", Value::Null);
        kinds.into_iter().map(|k| env.wrap(k)).collect()
    }

    fn step_complete(index: usize, title: &str, old: &Value, new: &Value) -> EventKind {
        EventKind::StepComplete {
            brain_title: "b".into(),
            depth: 0,
            step_index: index,
            step_title: title.into(),
            patch: patch::diff(old, new),
            halted: false,
        }
    }

    /// **Scenario**: Replaying START + two completed steps leaves the frame at
    /// the accumulated state and the next step index, with both tree nodes
    /// complete.
    #[test]
    fn replay_linear_progress() {
        let s0 = json!({});
        let s1 = json!({"a": 1});
        let s2 = json!({"a": 2});
        let log = wrap_all(vec![
            EventKind::Start {
                brain_title: "b".into(),
                initial_state: s0.clone(),
                structure: structure(&["one", "two"]),
            },
            EventKind::StepStart {
                brain_title: "b".into(),
                depth: 0,
                step_index: 0,
                step_title: "one".into(),
                step_type: StepType::Plain,
                child_brain_title: None,
                child_initial_state: None,
            },
            step_complete(0, "one", &s0, &s1),
            EventKind::StepStart {
                brain_title: "b".into(),
                depth: 0,
                step_index: 1,
                step_title: "two".into(),
                step_type: StepType::Plain,
                child_brain_title: None,
                child_initial_state: None,
            },
            step_complete(1, "two", &s1, &s2),
        ]);
        let r = replay(&log).unwrap();
        assert_eq!(r.frames.len(), 1);
        assert_eq!(r.frames[0].state, s2);
        assert_eq!(r.frames[0].step_index, 2);
        assert_eq!(r.step_tree[0].status, StepExecutionStatus::Complete);
        assert_eq!(r.step_tree[1].status, StepExecutionStatus::Complete);
    }

    /// **Scenario**: A nested STEP_START pushes a child frame seeded with the
    /// adapted state; the parent STEP_COMPLETE pops it and applies the parent
    /// patch.
    #[test]
    fn replay_nested_frames() {
        let parent0 = json!({"p": 1});
        let child0 = json!({"c": 1});
        let parent1 = json!({"p": 2});
        let mut log = wrap_all(vec![
            EventKind::Start {
                brain_title: "outer".into(),
                initial_state: parent0.clone(),
                structure: BrainStructure {
                    title: "outer".into(),
                    description: None,
                    steps: vec![StepNode {
                        step_type: StepType::Brain,
                        title: "delegate".into(),
                        inner: Some(structure(&["inner one"])),
                    }],
                },
            },
            EventKind::StepStart {
                brain_title: "outer".into(),
                depth: 0,
                step_index: 0,
                step_title: "delegate".into(),
                step_type: StepType::Brain,
                child_brain_title: Some("b".into()),
                child_initial_state: Some(child0.clone()),
            },
        ]);
        {
            let mut r = replay(&log).unwrap();
            assert_eq!(r.frames.len(), 2);
            assert_eq!(r.frames[1].brain_title, "b");
            assert_eq!(r.frames[1].state, child0);
            // mark the child's step running to check the tree path
            let ev = EnvelopeState::new("run-1", Value::Null).wrap(EventKind::StepStart {
                brain_title: "b".into(),
                depth: 1,
                step_index: 0,
                step_title: "inner one".into(),
                step_type: StepType::Plain,
                child_brain_title: None,
                child_initial_state: None,
            });
            reduce(&mut r, &ev).unwrap();
            let inner = r.step_tree[0].inner_steps.as_ref().unwrap();
            assert_eq!(inner[0].status, StepExecutionStatus::Running);
        }
        log.extend(wrap_all(vec![EventKind::StepComplete {
            brain_title: "outer".into(),
            depth: 0,
            step_index: 0,
            step_title: "delegate".into(),
            patch: patch::diff(&parent0, &parent1),
            halted: false,
        }]));
        let r = replay(&log).unwrap();
        assert_eq!(r.frames.len(), 1);
        assert_eq!(r.frames[0].state, parent1);
        assert_eq!(r.frames[0].step_index, 1);
    }

    /// **Scenario**: The agent conversation is rebuilt in engine order: user
    /// prompt, assistant with attached tool call, tool result, injected user
    /// message.
    #[test]
    fn replay_agent_conversation() {
        let events = wrap_all(vec![
            EventKind::Start {
                brain_title: "b".into(),
                initial_state: json!({}),
                structure: structure(&["ask"]),
            },
            EventKind::StepStart {
                brain_title: "b".into(),
                depth: 0,
                step_index: 0,
                step_title: "ask".into(),
                step_type: StepType::Agent,
                child_brain_title: None,
                child_initial_state: None,
            },
            EventKind::AgentStart {
                step_title: "ask".into(),
                prompt: "find x".into(),
                system: None,
            },
            EventKind::AgentIteration {
                iteration: 1,
                total_tokens: 0,
            },
            EventKind::AgentAssistantMessage {
                content: "looking".into(),
            },
            EventKind::AgentToolCall {
                tool_call_id: "c1".into(),
                tool_name: "lookup".into(),
                input: json!({"id": "x"}),
            },
            EventKind::AgentToolResult {
                tool_call_id: "c1".into(),
                tool_name: "lookup".into(),
                result: json!({"found": true}),
            },
            EventKind::AgentUserMessage {
                content: "hurry up!".into(),
            },
        ]);
        let r = replay(&events).unwrap();
        let agent = r.agent.as_ref().expect("agent context");
        let conv = agent.conversation();
        assert_eq!(conv.len(), 4);
        assert_eq!(conv[0].content, "find x");
        assert_eq!(conv[1].tool_calls[0].tool_name, "lookup");
        assert_eq!(conv[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(conv[3].content, "hurry up!");
        assert!(agent.pending_tool_call.is_none());
    }

    /// **Scenario**: A derived resume context reflects the deepest batch
    /// progress after a chunk completes.
    #[test]
    fn derived_context_carries_batch_progress() {
        let events = wrap_all(vec![
            EventKind::Start {
                brain_title: "b".into(),
                initial_state: json!({}),
                structure: structure(&["fan"]),
            },
            EventKind::StepStart {
                brain_title: "b".into(),
                depth: 0,
                step_index: 0,
                step_title: "fan".into(),
                step_type: StepType::BatchAgent,
                child_brain_title: None,
                child_initial_state: None,
            },
            EventKind::BatchChunkComplete {
                step_title: "fan".into(),
                results: vec![BatchItemResult {
                    index: 0,
                    result: json!("r0"),
                }],
                processed: 1,
                total: 3,
            },
        ]);
        let r = replay(&events).unwrap();
        let ctx = r.resume_context().expect("context");
        let batch = ctx.batch.as_ref().expect("batch branch");
        assert_eq!(batch.processed, 1);
        assert_eq!(batch.results.len(), 1);
    }

    /// **Scenario**: After a WEBHOOK event the derived resume context carries
    /// the webhook branch at the deepest node.
    #[test]
    fn derived_context_carries_webhook_wait() {
        let events = wrap_all(vec![
            EventKind::Start {
                brain_title: "b".into(),
                initial_state: json!({}),
                structure: structure(&["notify"]),
            },
            EventKind::StepStart {
                brain_title: "b".into(),
                depth: 0,
                step_index: 0,
                step_title: "notify".into(),
                step_type: StepType::Plain,
                child_brain_title: None,
                child_initial_state: None,
            },
            EventKind::Webhook {
                wait_for: vec![WebhookRegistration {
                    slug: "slack".into(),
                    identifier: "t-1".into(),
                    schema: Value::Null,
                }],
            },
        ]);
        let r = replay(&events).unwrap();
        let ctx = r.resume_context().expect("context");
        let webhook = ctx.webhook.as_ref().expect("webhook branch");
        assert_eq!(webhook.wait_for[0].identifier, "t-1");
        assert!(ctx.agent.is_none());
    }

    /// **Scenario**: Terminal events set exactly their flag and retag running
    /// steps.
    #[test]
    fn terminal_flags_and_retagging() {
        let mut r = RunReduction::default();
        let mut env = EnvelopeState::new("run-1", Value::Null);
        reduce(
            &mut r,
            &env.wrap(EventKind::Start {
                brain_title: "b".into(),
                initial_state: json!({}),
                structure: structure(&["one"]),
            }),
        )
        .unwrap();
        reduce(
            &mut r,
            &env.wrap(EventKind::StepStart {
                brain_title: "b".into(),
                depth: 0,
                step_index: 0,
                step_title: "one".into(),
                step_type: StepType::Plain,
                child_brain_title: None,
                child_initial_state: None,
            }),
        )
        .unwrap();
        reduce(&mut r, &env.wrap(EventKind::Cancelled)).unwrap();
        assert!(r.is_killed);
        assert!(!r.is_paused);
        assert_eq!(r.step_tree[0].status, StepExecutionStatus::Cancelled);
    }

    /// **Scenario**: A stored patch that does not apply is a corrupt log.
    #[test]
    fn bad_stored_patch_is_internal_error() {
        let bad_patch: json_patch::Patch =
            serde_json::from_value(json!([{"op": "replace", "path": "/missing/deep", "value": 1}]))
                .unwrap();
        let log = wrap_all(vec![
            EventKind::Start {
                brain_title: "b".into(),
                initial_state: json!({}),
                structure: structure(&["one"]),
            },
            EventKind::StepComplete {
                brain_title: "b".into(),
                depth: 0,
                step_index: 0,
                step_title: "one".into(),
                patch: bad_patch,
                halted: false,
            },
        ]);
        let err = replay(&log).unwrap_err();
        assert!(err.to_string().contains("patch"));
    }
}
