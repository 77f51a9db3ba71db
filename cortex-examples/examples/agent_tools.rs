//! Example: an agent step with a lookup tool and a terminal tool.
//!
//! The scripted mock client calls `lookup` once, then finishes through the
//! terminal `done` tool; the terminal input becomes the step's result state.
//! Swap the mock for a real `ObjectGenerator` implementation to run against
//! a provider.
//!
//! Run: `cargo run -p cortex-examples --example agent_tools`

use std::sync::Arc;

use cortex::{
    AgentSpec, BrainDefinition, EventKind, MockGenerator, RunParams, ToolDef, ToolReturn,
};
use serde_json::json;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() {
    let brain = BrainDefinition::new("releaser").agent_step("decide", |_ctx| async move {
        Ok(AgentSpec::new("Should we ship the release? Look up the test run first.")
            .with_system("You are a careful release manager.")
            .tool(
                "lookup",
                ToolDef::new(
                    "Looks up the latest CI run for a branch",
                    json!({
                        "type": "object",
                        "properties": {"branch": {"type": "string"}},
                        "required": ["branch"]
                    }),
                )
                .executes(|input, _ctx| async move {
                    println!("  (lookup tool ran for {})", input["branch"]);
                    Ok(ToolReturn::Value(json!({"ci": "green"})))
                }),
            )
            .tool(
                "done",
                ToolDef::new("Records the decision", json!({"type": "object"})).terminal(),
            )
            .with_max_iterations(5))
    });

    let client = Arc::new(MockGenerator::new(vec![
        MockGenerator::tool_call_turn("call-1", "lookup", json!({"branch": "main"})),
        MockGenerator::tool_call_turn("call-2", "done", json!({"ship": true})),
    ]));

    let mut stream = cortex::run(&brain, RunParams::new(client));
    while let Some(event) = stream.next().await {
        match &event.kind {
            EventKind::AgentToolCall {
                tool_name, input, ..
            } => println!("tool call: {} {}", tool_name, input),
            EventKind::AgentComplete {
                result,
                terminal_tool_name,
            } => println!("agent done via {}: {}", terminal_tool_name, result),
            EventKind::Complete { final_state } => println!("final state: {}", final_state),
            _ => {}
        }
    }
}
