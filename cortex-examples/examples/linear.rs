//! Example: a two-step linear brain, watched through its event stream.
//!
//! Builds a brain with two deterministic steps, runs it with the mock client
//! (no step calls the LLM), and prints each event kind plus the patch every
//! step contributes.
//!
//! Run: `cargo run -p cortex-examples --example linear`

use std::sync::Arc;

use cortex::{BrainDefinition, EventKind, MockGenerator, RunParams, StepReturn};
use serde_json::json;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() {
    let brain = BrainDefinition::new("greeter")
        .with_description("composes and signs a greeting")
        .step("compose", |_ctx| async move {
            Ok(StepReturn::state(json!({"greeting": "hello, world"})))
        })
        .step("sign", |ctx| async move {
            let mut state = ctx.state.clone();
            state["signed_by"] = json!("cortex");
            Ok(StepReturn::state(state))
        });

    let params = RunParams::new(Arc::new(MockGenerator::with_text("unused")));
    let mut stream = cortex::run(&brain, params);
    while let Some(event) = stream.next().await {
        match &event.kind {
            EventKind::StepComplete {
                step_title, patch, ..
            } => {
                println!(
                    "{:>4} {} {} {}",
                    event.seq,
                    event.kind.name(),
                    step_title,
                    serde_json::to_string(patch).unwrap_or_default()
                );
            }
            EventKind::Complete { final_state } => {
                println!("{:>4} COMPLETE {}", event.seq, final_state);
            }
            _ => println!("{:>4} {}", event.seq, event.kind.name()),
        }
    }
}
