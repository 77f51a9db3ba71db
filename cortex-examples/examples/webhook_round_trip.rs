//! Example: a step that waits on a webhook and resumes with the response.
//!
//! The step registers a webhook on first execution; the run suspends after
//! the `WEBHOOK` event. The host later queues the `WEBHOOK_RESPONSE` signal
//! and resumes; the step re-runs with `ctx.response` set and completes.
//!
//! Run: `cargo run -p cortex-examples --example webhook_round_trip`

use std::sync::Arc;

use cortex::{
    BrainDefinition, EventKind, MockGenerator, QueueSignalProvider, ResumeContext, ResumeParams,
    RunParams, Signal, SignalProvider, StepReturn, WebhookRegistration,
};
use serde_json::json;
use tokio_stream::StreamExt;

fn brain() -> BrainDefinition {
    BrainDefinition::new("announcer").step("post to channel", |ctx| async move {
        match &ctx.response {
            Some(response) => {
                let mut state = ctx.state.clone();
                state["thread_id"] = response["threadId"].clone();
                Ok(StepReturn::state(state))
            }
            None => Ok(
                StepReturn::state(ctx.state.clone()).with_webhooks(vec![WebhookRegistration {
                    slug: "slack".into(),
                    identifier: "announce-1".into(),
                    schema: json!({
                        "type": "object",
                        "properties": {"threadId": {"type": "string"}}
                    }),
                }]),
            ),
        }
    })
}

#[tokio::main]
async fn main() {
    let brain = brain();
    let event_log: Vec<_> = cortex::run(
        &brain,
        RunParams::new(Arc::new(MockGenerator::with_text("unused"))),
    )
    .collect()
    .await;
    for event in &event_log {
        if let EventKind::Webhook { wait_for } = &event.kind {
            println!("waiting on {}#{}", wait_for[0].slug, wait_for[0].identifier);
        }
    }

    let resume_context = match &event_log.last().unwrap().kind {
        EventKind::Paused { resume_context } => ResumeContext::from_value(resume_context).unwrap(),
        other => panic!("expected a suspended run, got {}", other.name()),
    };

    // the out-of-band reply arrives; the host queues it and resumes
    let signals = Arc::new(QueueSignalProvider::new());
    signals
        .queue(Signal::WebhookResponse {
            response: json!({"threadId": "T-4711"}),
        })
        .await;

    let events: Vec<_> = cortex::resume_run(
        &brain,
        ResumeParams {
            run: RunParams::new(Arc::new(MockGenerator::with_text("unused")))
                .with_signals(signals as Arc<dyn SignalProvider>),
            event_log,
            resume_context,
        },
    )
    .collect()
    .await;

    if let EventKind::Complete { final_state } = &events.last().unwrap().kind {
        println!("final state: {}", final_state);
    }
}
