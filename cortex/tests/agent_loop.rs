//! Agent loop behavior: tool dispatch, terminal tools, user-message
//! injection, and limits.


use std::sync::Arc;

use cortex::{
    AgentSpec, BrainDefinition, BrainEvent, EventKind, MockGenerator, QueueSignalProvider,
    RunParams, Signal, SignalProvider, ToolDef, ToolReturn,
};
use serde_json::json;
use tokio_stream::StreamExt;

fn kinds(events: &[BrainEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind.name()).collect()
}

fn object_schema() -> serde_json::Value {
    json!({"type": "object"})
}

/// Brain with one agent step: a non-terminal `lookup` tool and a terminal
/// `done` tool. When `inject` is set, the lookup execute queues a user
/// message before returning, so it is visible at the next iteration boundary.
fn lookup_done_brain(inject: Option<Arc<QueueSignalProvider>>) -> BrainDefinition {
    BrainDefinition::new("agentic").agent_step("ask", move |_ctx| {
        let inject = inject.clone();
        async move {
            Ok(AgentSpec::new("find x")
                .with_system("be terse")
                .tool(
                    "lookup",
                    ToolDef::new("look a thing up", object_schema()).executes(
                        move |_input, _ctx| {
                            let inject = inject.clone();
                            async move {
                                if let Some(signals) = &inject {
                                    signals
                                        .queue(Signal::UserMessage {
                                            content: "hurry up!".into(),
                                        })
                                        .await;
                                }
                                Ok(ToolReturn::Value(json!({"found": true})))
                            }
                        },
                    ),
                )
                .tool(
                    "done",
                    ToolDef::new("finish up", object_schema()).terminal(),
                ))
        }
    })
}

fn lookup_then_done_client() -> MockGenerator {
    MockGenerator::new(vec![
        MockGenerator::tool_call_turn("call-1", "lookup", json!({"id": "x"})),
        MockGenerator::tool_call_turn("call-2", "done", json!({"result": "ok"})),
    ])
}

#[tokio::test]
async fn non_terminal_then_terminal_tool_flow() {
    let client = Arc::new(lookup_then_done_client());
    let def = lookup_done_brain(None);
    let events = cortex::run(
        &def,
        RunParams::new(Arc::clone(&client) as Arc<dyn cortex::ObjectGenerator>),
    )
    .collect::<Vec<_>>()
    .await;

    assert_eq!(
        kinds(&events),
        vec![
            "START",
            "STEP_STATUS",
            "STEP_START",
            "AGENT_START",
            "AGENT_ITERATION",
            "AGENT_RAW_RESPONSE_MESSAGE",
            "AGENT_TOOL_CALL",
            "AGENT_TOOL_RESULT",
            "AGENT_ITERATION",
            "AGENT_RAW_RESPONSE_MESSAGE",
            "AGENT_TOOL_CALL",
            "AGENT_COMPLETE",
            "STEP_COMPLETE",
            "STEP_STATUS",
            "COMPLETE",
        ]
    );

    match &events[11].kind {
        EventKind::AgentComplete {
            result,
            terminal_tool_name,
        } => {
            assert_eq!(result, &json!({"result": "ok"}));
            assert_eq!(terminal_tool_name, "done");
        }
        other => panic!("expected AGENT_COMPLETE, got {:?}", other),
    }
    // the terminal tool input becomes the step result state
    match &events.last().unwrap().kind {
        EventKind::Complete { final_state } => assert_eq!(final_state, &json!({"result": "ok"})),
        other => panic!("expected COMPLETE, got {:?}", other),
    }

    // the second LLM call saw the assistant tool call and its result
    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].system.as_deref(), Some("be terse"));
    let second = &requests[1].messages;
    assert_eq!(second[0].content, "find x");
    assert_eq!(second[1].tool_calls[0].tool_name, "lookup");
    assert_eq!(second[2].tool_call_id.as_deref(), Some("call-1"));
}

#[tokio::test]
async fn terminal_tool_fires_exactly_once_and_ends_iterations() {
    let client = Arc::new(lookup_then_done_client());
    let def = lookup_done_brain(None);
    let events = cortex::run(&def, RunParams::new(client as Arc<dyn cortex::ObjectGenerator>))
        .collect::<Vec<_>>()
        .await;

    let completes = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::AgentComplete { .. }))
        .count();
    assert_eq!(completes, 1);
    let complete_pos = events
        .iter()
        .position(|e| matches!(e.kind, EventKind::AgentComplete { .. }))
        .unwrap();
    assert!(!events[complete_pos..]
        .iter()
        .any(|e| matches!(e.kind, EventKind::AgentIteration { .. })));
}

#[tokio::test]
async fn user_message_joins_next_iteration_and_conversation() {
    let signals = Arc::new(QueueSignalProvider::new());
    let def = lookup_done_brain(Some(Arc::clone(&signals)));
    let client = Arc::new(lookup_then_done_client());
    let params = RunParams::new(Arc::clone(&client) as Arc<dyn cortex::ObjectGenerator>)
        .with_signals(Arc::clone(&signals) as Arc<dyn SignalProvider>);
    let events = cortex::run(&def, params).collect::<Vec<_>>().await;

    let user_pos = events
        .iter()
        .position(|e| matches!(e.kind, EventKind::AgentUserMessage { .. }))
        .expect("AGENT_USER_MESSAGE emitted");
    let second_iteration_pos = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e.kind, EventKind::AgentIteration { .. }))
        .map(|(i, _)| i)
        .nth(1)
        .expect("two iterations");
    assert!(
        user_pos < second_iteration_pos,
        "user message must precede AGENT_ITERATION(2)"
    );

    // the injected message reached the model on the second call
    let second_request = &client.requests()[1];
    let last = second_request.messages.last().unwrap();
    assert_eq!(last.content, "hurry up!");
}

#[tokio::test]
async fn iteration_limit_discards_in_flight_work() {
    // the model keeps asking for lookups; with max_iterations = 2 the second
    // response's tool call is discarded
    let client = Arc::new(MockGenerator::new(vec![
        MockGenerator::tool_call_turn("c1", "lookup", json!({})),
        MockGenerator::tool_call_turn("c2", "lookup", json!({})),
    ]));
    let def = BrainDefinition::new("bounded").agent_step("ask", |_ctx| async move {
        Ok(AgentSpec::new("loop forever")
            .tool(
                "lookup",
                ToolDef::new("look", json!({"type": "object"}))
                    .executes(|_input, _ctx| async move {
                        Ok(ToolReturn::Value(json!({"found": false})))
                    }),
            )
            .with_max_iterations(2))
    });
    let events = cortex::run(&def, RunParams::new(client as Arc<dyn cortex::ObjectGenerator>))
        .collect::<Vec<_>>()
        .await;

    let limit_pos = events
        .iter()
        .position(|e| matches!(e.kind, EventKind::AgentIterationLimit { .. }))
        .expect("AGENT_ITERATION_LIMIT emitted");
    // the discarded call produced no AGENT_TOOL_CALL or result after the limit
    let calls = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::AgentToolCall { .. }))
        .count();
    assert_eq!(calls, 1, "second iteration's tool call is discarded");
    assert!(limit_pos < events.len() - 1);
    match &events.last().unwrap().kind {
        EventKind::Error { error } => assert_eq!(error.name, "IterationLimitExceeded"),
        other => panic!("expected ERROR, got {:?}", other),
    }
}

#[tokio::test]
async fn token_limit_exits_error_class() {
    // each mock turn burns 10 tokens; the limit trips after the second call
    let client = Arc::new(MockGenerator::new(vec![
        MockGenerator::tool_call_turn("c1", "lookup", json!({})),
        MockGenerator::text_turn("still thinking"),
    ]));
    let def = BrainDefinition::new("token bounded").agent_step("ask", |_ctx| async move {
        Ok(AgentSpec::new("think")
            .tool(
                "lookup",
                ToolDef::new("look", json!({"type": "object"}))
                    .executes(|_input, _ctx| async move {
                        Ok(ToolReturn::Value(json!({"found": false})))
                    }),
            )
            .with_max_tokens(15))
    });
    let events = cortex::run(&def, RunParams::new(client as Arc<dyn cortex::ObjectGenerator>))
        .collect::<Vec<_>>()
        .await;

    match &events.last().unwrap().kind {
        EventKind::Error { error } => assert_eq!(error.name, "TokenLimitExceeded"),
        other => panic!("expected ERROR, got {:?}", other),
    }
    let limit = events
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::AgentTokenLimit {
                total_tokens,
                max_tokens,
            } => Some((*total_tokens, *max_tokens)),
            _ => None,
        })
        .expect("AGENT_TOKEN_LIMIT emitted");
    assert_eq!(limit, (20, 15));
}

#[tokio::test]
async fn tool_input_failing_schema_is_a_validation_error() {
    let client = Arc::new(MockGenerator::new(vec![MockGenerator::tool_call_turn(
        "c1",
        "lookup",
        json!({}),
    )]));
    let def = BrainDefinition::new("strict tools").agent_step("ask", |_ctx| async move {
        Ok(AgentSpec::new("look up").tool(
            "lookup",
            ToolDef::new(
                "needs an id",
                json!({"type": "object", "required": ["id"]}),
            )
            .executes(|_input, _ctx| async move { Ok(ToolReturn::Value(json!(null))) }),
        ))
    });
    let events = cortex::run(&def, RunParams::new(client as Arc<dyn cortex::ObjectGenerator>))
        .collect::<Vec<_>>()
        .await;
    match &events.last().unwrap().kind {
        EventKind::Error { error } => {
            assert_eq!(error.name, "ValidationError");
            assert!(error.message.contains("tool input"));
        }
        other => panic!("expected ERROR, got {:?}", other),
    }
}

/// Generator that queues a KILL on entry and then parks until its cancel
/// token fires, mimicking a long LLM call interrupted by the host.
struct KillThenStall {
    signals: Arc<QueueSignalProvider>,
}

#[async_trait::async_trait]
impl cortex::ObjectGenerator for KillThenStall {
    async fn generate_text(
        &self,
        request: cortex::GenerateTextRequest,
    ) -> Result<cortex::GeneratedText, cortex::GeneratorError> {
        self.signals.queue(Signal::Kill).await;
        request.cancel.cancelled().await;
        Err(cortex::GeneratorError::Cancelled)
    }

    async fn generate_object(
        &self,
        _request: cortex::GenerateObjectRequest,
    ) -> Result<cortex::GeneratedObject, cortex::GeneratorError> {
        Err(cortex::GeneratorError::Failed("unsupported".into()))
    }
}

#[tokio::test]
async fn kill_during_llm_call_cancels_and_abandons_partial_output() {
    let signals = Arc::new(QueueSignalProvider::new());
    let client = Arc::new(KillThenStall {
        signals: Arc::clone(&signals),
    });
    let def = BrainDefinition::new("interruptible")
        .agent_step("ask", |_ctx| async move { Ok(AgentSpec::new("go")) });
    let events = cortex::run(
        &def,
        RunParams::new(client as Arc<dyn cortex::ObjectGenerator>)
            .with_signals(Arc::clone(&signals) as Arc<dyn SignalProvider>),
    )
    .collect::<Vec<_>>()
    .await;

    assert_eq!(events.last().unwrap().kind.name(), "CANCELLED");
    // the abandoned call contributed no messages or tool events
    assert!(!events.iter().any(|e| matches!(
        e.kind,
        EventKind::AgentRawResponseMessage { .. }
            | EventKind::AgentAssistantMessage { .. }
            | EventKind::AgentToolCall { .. }
    )));
}

#[tokio::test]
async fn unknown_tool_call_fails_the_step() {
    let client = Arc::new(MockGenerator::new(vec![MockGenerator::tool_call_turn(
        "c1",
        "missing",
        json!({}),
    )]));
    let def = BrainDefinition::new("no such tool").agent_step("ask", |_ctx| async move {
        Ok(AgentSpec::new("try"))
    });
    let events = cortex::run(&def, RunParams::new(client as Arc<dyn cortex::ObjectGenerator>))
        .collect::<Vec<_>>()
        .await;
    match &events.last().unwrap().kind {
        EventKind::Error { error } => assert_eq!(error.name, "UnknownTool"),
        other => panic!("expected ERROR, got {:?}", other),
    }
}
