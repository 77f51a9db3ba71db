//! The agent-loop sub-machine: LLM call → tool dispatch → signal check.
//!
//! Each iteration drains queued user messages, checks KILL/PAUSE, calls the
//! client, emits raw/assistant messages before tool calls, and dispatches
//! tool calls in the order the model returned them. A terminal tool ends the
//! loop with its input as the step result; a tool returning webhooks
//! suspends the loop with the pending call captured for resume. Token and
//! iteration limits exit error-class after their limit events; work in
//! flight at the iteration limit is discarded, not recorded.
//!
//! KILL is the only signal observed while an LLM call is in flight: it
//! cancels the injected token and the partial response is abandoned.

use std::sync::Arc;

use brain_event::{EventKind, SerializedError, WebhookRegistration};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::client::{ChatMessage, GenerateTextRequest, GeneratorError, ToolCallRequest};
use crate::definition::{validate_against, AgentBodyFn, AgentSpec, ToolReturn};
use crate::resume::AgentResumeState;
use crate::signal::{Signal, SignalKind};

use super::{Driver, StreamClosed};

/// Outcome of one agent step (or one batch item's loop).
pub(crate) enum AgentStepOutcome {
    /// Terminal tool fired; its input is the step result state.
    Completed(Value),
    Cancelled,
    /// PAUSE at an iteration boundary; context carried for resume.
    Paused(AgentResumeState),
    /// A tool is waiting on webhooks; context includes the pending call.
    Webhook {
        agent: AgentResumeState,
        wait_for: Vec<WebhookRegistration>,
    },
    /// Error-class exit: user failure, unknown tool, or a limit.
    Failed(SerializedError),
}

/// Flow control from dispatching a single tool call.
enum ToolFlow {
    Continue,
    Terminal(Value),
    Webhook { wait_for: Vec<WebhookRegistration> },
    Failed(SerializedError),
}

impl Driver {
    /// Evaluates the step body into an [`AgentSpec`] and runs the loop.
    pub(crate) async fn run_agent_step(
        &mut self,
        title: &str,
        body: &AgentBodyFn,
        state: &Value,
        resume: Option<(AgentResumeState, Option<Value>)>,
    ) -> Result<AgentStepOutcome, StreamClosed> {
        let ctx = self.step_context(state.clone(), None);
        let spec = match (body)(ctx).await {
            Ok(spec) => spec,
            Err(failure) => return Ok(AgentStepOutcome::Failed(failure.serialized())),
        };
        self.run_agent_loop(title, &spec, state, resume).await
    }

    /// Runs the loop itself. `resume` restores the conversation and counters;
    /// when a webhook response is attached, it is delivered as the pending
    /// tool call's result before iterations continue.
    pub(crate) async fn run_agent_loop(
        &mut self,
        title: &str,
        spec: &AgentSpec,
        state: &Value,
        resume: Option<(AgentResumeState, Option<Value>)>,
    ) -> Result<AgentStepOutcome, StreamClosed> {
        let mut messages: Vec<ChatMessage>;
        let mut iteration: u32;
        let mut total_tokens: u64;

        match resume {
            None => {
                self.emitter
                    .emit(EventKind::AgentStart {
                        step_title: title.to_string(),
                        prompt: spec.prompt.clone(),
                        system: spec.system.clone(),
                    })
                    .await?;
                messages = vec![ChatMessage::user(spec.prompt.clone())];
                iteration = 0;
                total_tokens = 0;
            }
            Some((saved, response)) => {
                iteration = saved.iteration;
                total_tokens = saved.total_tokens;
                messages = saved.messages.clone();
                if let Some(pending) = saved.pending_tool_call.clone() {
                    let Some(response) = response else {
                        // no response was delivered; surface the wait again
                        let wait_for = saved.wait_for.clone();
                        self.emitter
                            .emit(EventKind::AgentWebhook {
                                wait_for: wait_for.clone(),
                                tool_call_id: pending.tool_call_id.clone(),
                                tool_name: pending.tool_name.clone(),
                            })
                            .await?;
                        return Ok(AgentStepOutcome::Webhook {
                            agent: saved,
                            wait_for,
                        });
                    };
                    self.emitter
                        .emit(EventKind::WebhookResponse {
                            response: response.clone(),
                        })
                        .await?;
                    self.emitter
                        .emit(EventKind::AgentToolResult {
                            tool_call_id: pending.tool_call_id.clone(),
                            tool_name: pending.tool_name.clone(),
                            result: response.clone(),
                        })
                        .await?;
                    messages.push(ChatMessage::tool_result(&pending.tool_call_id, &response));

                    // dispatch the calls deferred by the webhook wait
                    let deferred = saved.remaining_tool_calls.clone();
                    for (idx, call) in deferred.iter().enumerate() {
                        match self.dispatch_tool(spec, state, call, &mut messages).await? {
                            ToolFlow::Continue => {}
                            ToolFlow::Terminal(result) => {
                                return Ok(AgentStepOutcome::Completed(result))
                            }
                            ToolFlow::Webhook { wait_for } => {
                                let agent = AgentResumeState {
                                    iteration,
                                    total_tokens,
                                    messages: messages.clone(),
                                    pending_tool_call: Some(call.clone()),
                                    remaining_tool_calls: deferred[idx + 1..].to_vec(),
                                    wait_for: wait_for.clone(),
                                };
                                return Ok(AgentStepOutcome::Webhook { agent, wait_for });
                            }
                            ToolFlow::Failed(error) => {
                                return Ok(AgentStepOutcome::Failed(error))
                            }
                        }
                    }
                }
            }
        }

        loop {
            // 1. queued user messages join the conversation, in order
            while let Some(Signal::UserMessage { content }) = self
                .signals
                .take(&[SignalKind::UserMessage], true)
                .await
            {
                self.emitter
                    .emit(EventKind::AgentUserMessage {
                        content: content.clone(),
                    })
                    .await?;
                messages.push(ChatMessage::user(content));
            }

            // 2. iteration-boundary signal check
            match self
                .signals
                .take(&[SignalKind::Kill, SignalKind::Pause], true)
                .await
            {
                Some(Signal::Kill) => return Ok(AgentStepOutcome::Cancelled),
                Some(Signal::Pause) => {
                    return Ok(AgentStepOutcome::Paused(AgentResumeState {
                        iteration,
                        total_tokens,
                        messages,
                        pending_tool_call: None,
                        remaining_tool_calls: Vec::new(),
                        wait_for: Vec::new(),
                    }));
                }
                _ => {}
            }

            // 3.
            iteration += 1;
            self.emitter
                .emit(EventKind::AgentIteration {
                    iteration,
                    total_tokens,
                })
                .await?;

            // 4. LLM call; KILL mid-flight cancels the token and abandons it
            let cancel = CancellationToken::new();
            let request = GenerateTextRequest {
                system: spec.system.clone(),
                messages: messages.clone(),
                tools: spec.descriptors(),
                cancel: cancel.clone(),
            };
            let signals = Arc::clone(&self.signals);
            let client = Arc::clone(&self.client);
            let kill_filter = [SignalKind::Kill];
            let response = {
                let kill_wait = signals.take(&kill_filter, false);
                let generation = client.generate_text(request);
                tokio::pin!(kill_wait);
                tokio::pin!(generation);
                let mut kill_gone = false;
                loop {
                    tokio::select! {
                        biased;
                        sig = &mut kill_wait, if !kill_gone => {
                            if sig.is_some() {
                                cancel.cancel();
                                return Ok(AgentStepOutcome::Cancelled);
                            }
                            // blocking take resolved empty (out-of-contract
                            // provider); finish the call normally
                            kill_gone = true;
                        }
                        result = &mut generation => break match result {
                            Ok(response) => response,
                            Err(GeneratorError::Cancelled) => return Ok(AgentStepOutcome::Cancelled),
                            Err(e) => {
                                return Ok(AgentStepOutcome::Failed(SerializedError::new(
                                    "GeneratorError",
                                    e.to_string(),
                                )))
                            }
                        },
                    }
                }
            };
            total_tokens += response.usage.total_tokens;

            // 5. raw and assistant messages precede tool calls
            for raw in &response.response_messages {
                self.emitter
                    .emit(EventKind::AgentRawResponseMessage {
                        message: raw.clone(),
                    })
                    .await?;
            }
            let text = response.text.clone().unwrap_or_default();
            if !text.is_empty() {
                self.emitter
                    .emit(EventKind::AgentAssistantMessage {
                        content: text.clone(),
                    })
                    .await?;
            }
            messages.push(ChatMessage::assistant(text, response.tool_calls.clone()));

            // 6. tool calls, in model order
            let at_iteration_limit = spec
                .max_iterations
                .map(|max| iteration >= max)
                .unwrap_or(false);
            for (idx, call) in response.tool_calls.iter().enumerate() {
                let is_terminal = spec
                    .find_tool(&call.tool_name)
                    .map(|tool| tool.terminal)
                    .unwrap_or(false);
                if at_iteration_limit && !is_terminal {
                    return Ok(self
                        .iteration_limit_exit(iteration, spec.max_iterations.unwrap_or(iteration))
                        .await?);
                }
                match self.dispatch_tool(spec, state, call, &mut messages).await? {
                    ToolFlow::Continue => {}
                    ToolFlow::Terminal(result) => return Ok(AgentStepOutcome::Completed(result)),
                    ToolFlow::Webhook { wait_for } => {
                        let agent = AgentResumeState {
                            iteration,
                            total_tokens,
                            messages: messages.clone(),
                            pending_tool_call: Some(call.clone()),
                            remaining_tool_calls: response.tool_calls[idx + 1..].to_vec(),
                            wait_for: wait_for.clone(),
                        };
                        return Ok(AgentStepOutcome::Webhook { agent, wait_for });
                    }
                    ToolFlow::Failed(error) => return Ok(AgentStepOutcome::Failed(error)),
                }
            }

            // 7. token limit
            if let Some(max_tokens) = spec.max_tokens {
                if total_tokens >= max_tokens {
                    self.emitter
                        .emit(EventKind::AgentTokenLimit {
                            total_tokens,
                            max_tokens,
                        })
                        .await?;
                    return Ok(AgentStepOutcome::Failed(SerializedError::new(
                        "TokenLimitExceeded",
                        format!("agent used {} of {} allowed tokens", total_tokens, max_tokens),
                    )));
                }
            }

            // 8. iteration limit
            if at_iteration_limit {
                return Ok(self
                    .iteration_limit_exit(iteration, spec.max_iterations.unwrap_or(iteration))
                    .await?);
            }
        }
    }

    async fn iteration_limit_exit(
        &mut self,
        iteration: u32,
        max_iterations: u32,
    ) -> Result<AgentStepOutcome, StreamClosed> {
        self.emitter
            .emit(EventKind::AgentIterationLimit {
                iteration,
                max_iterations,
            })
            .await?;
        Ok(AgentStepOutcome::Failed(SerializedError::new(
            "IterationLimitExceeded",
            format!("agent reached the {} iteration limit", max_iterations),
        )))
    }

    /// Emits `AGENT_TOOL_CALL`, validates input, and executes or terminates.
    async fn dispatch_tool(
        &mut self,
        spec: &AgentSpec,
        state: &Value,
        call: &ToolCallRequest,
        messages: &mut Vec<ChatMessage>,
    ) -> Result<ToolFlow, StreamClosed> {
        self.emitter
            .emit(EventKind::AgentToolCall {
                tool_call_id: call.tool_call_id.clone(),
                tool_name: call.tool_name.clone(),
                input: call.args.clone(),
            })
            .await?;

        let Some(tool) = spec.find_tool(&call.tool_name) else {
            return Ok(ToolFlow::Failed(SerializedError::new(
                "UnknownTool",
                format!("tool {} is not defined for this step", call.tool_name),
            )));
        };
        if let Err(failure) = validate_against(&tool.input_schema, &call.args, "tool input") {
            return Ok(ToolFlow::Failed(failure.serialized()));
        }

        if tool.terminal {
            self.emitter
                .emit(EventKind::AgentComplete {
                    result: call.args.clone(),
                    terminal_tool_name: call.tool_name.clone(),
                })
                .await?;
            return Ok(ToolFlow::Terminal(call.args.clone()));
        }

        let Some(execute) = &tool.execute else {
            return Ok(ToolFlow::Failed(SerializedError::new(
                "ToolNotExecutable",
                format!("tool {} has no execute and is not terminal", call.tool_name),
            )));
        };
        let ctx = self.step_context(state.clone(), None);
        match (execute)(call.args.clone(), ctx).await {
            Ok(ToolReturn::Value(result)) => {
                self.emitter
                    .emit(EventKind::AgentToolResult {
                        tool_call_id: call.tool_call_id.clone(),
                        tool_name: call.tool_name.clone(),
                        result: result.clone(),
                    })
                    .await?;
                messages.push(ChatMessage::tool_result(&call.tool_call_id, &result));
                Ok(ToolFlow::Continue)
            }
            Ok(ToolReturn::WaitFor(wait_for)) => {
                self.emitter
                    .emit(EventKind::AgentWebhook {
                        wait_for: wait_for.clone(),
                        tool_call_id: call.tool_call_id.clone(),
                        tool_name: call.tool_name.clone(),
                    })
                    .await?;
                Ok(ToolFlow::Webhook { wait_for })
            }
            Err(failure) => Ok(ToolFlow::Failed(failure.serialized())),
        }
    }
}
