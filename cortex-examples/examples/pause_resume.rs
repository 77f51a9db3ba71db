//! Example: pause a run between steps, persist its log, and resume it.
//!
//! The first step queues a PAUSE while it runs, so the engine stops at the
//! next boundary with a `PAUSED` event carrying the resume context. The
//! collected event log plus that context are everything `resume` needs; the
//! second stream picks up at the second step without re-running the first.
//!
//! Run: `cargo run -p cortex-examples --example pause_resume`

use std::sync::Arc;

use cortex::{
    BrainDefinition, EventKind, MockGenerator, QueueSignalProvider, ResumeContext, ResumeParams,
    RunParams, Signal, SignalProvider, StepReturn,
};
use serde_json::json;
use tokio_stream::StreamExt;

fn brain(signals: Arc<QueueSignalProvider>) -> BrainDefinition {
    BrainDefinition::new("pausable")
        .step("expensive fetch", move |_ctx| {
            let signals = Arc::clone(&signals);
            async move {
                signals.queue(Signal::Pause).await;
                Ok(StepReturn::state(json!({"fetched": 42})))
            }
        })
        .step("summarize", |ctx| async move {
            let mut state = ctx.state.clone();
            state["summary"] = json!("42 records fetched");
            Ok(StepReturn::state(state))
        })
}

#[tokio::main]
async fn main() {
    let signals = Arc::new(QueueSignalProvider::new());
    let brain = brain(Arc::clone(&signals));

    let params = RunParams::new(Arc::new(MockGenerator::with_text("unused")))
        .with_signals(Arc::clone(&signals) as Arc<dyn SignalProvider>);
    let event_log: Vec<_> = cortex::run(&brain, params).collect().await;
    for event in &event_log {
        println!("first stream: {}", event.kind.name());
    }

    let resume_context = match &event_log.last().unwrap().kind {
        EventKind::Paused { resume_context } => ResumeContext::from_value(resume_context).unwrap(),
        other => panic!("expected a paused run, got {}", other.name()),
    };
    println!("paused at step index {}", resume_context.step_index);

    let resumed = cortex::resume_run(
        &brain,
        ResumeParams {
            run: RunParams::new(Arc::new(MockGenerator::with_text("unused"))),
            event_log,
            resume_context,
        },
    );
    let events: Vec<_> = resumed.collect().await;
    for event in &events {
        println!("second stream: {}", event.kind.name());
    }
    if let EventKind::Complete { final_state } = &events.last().unwrap().kind {
        println!("final state: {}", final_state);
    }
}
