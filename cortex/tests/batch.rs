//! Batch agent steps: chunked results, mid-batch pause, and resume at the
//! first unprocessed item.


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cortex::{
    AgentSpec, BrainDefinition, BrainEvent, EventKind, MockGenerator, ObjectGenerator,
    QueueSignalProvider, ResumeContext, ResumeParams, RunParams, Signal, SignalProvider, ToolDef,
};
use serde_json::json;
use tokio_stream::StreamExt;

fn terminal_turn(index: usize) -> cortex::GeneratedText {
    MockGenerator::tool_call_turn(
        format!("c{}", index),
        "emit",
        json!({"processed": index}),
    )
}

/// Batch brain over three items, chunk size two. When `pause_at_item` is set,
/// that item's body queues a PAUSE the first time it runs.
fn batch_brain(
    signals: Option<(Arc<QueueSignalProvider>, usize, Arc<AtomicBool>)>,
) -> BrainDefinition {
    BrainDefinition::new("fanout").batch_agent(
        "process items",
        2,
        Some(json!({"type": "object"})),
        |_ctx| async move { Ok(vec![json!({"n": 0}), json!({"n": 1}), json!({"n": 2})]) },
        move |item, _ctx| {
            let signals = signals.clone();
            async move {
                if let Some((signals, pause_at_item, done)) = &signals {
                    if item["n"] == json!(*pause_at_item) && !done.swap(true, Ordering::SeqCst) {
                        signals.queue(Signal::Pause).await;
                    }
                }
                Ok(AgentSpec::new(format!("process item {}", item["n"])).tool(
                    "emit",
                    ToolDef::new("report the item result", json!({"type": "object"})).terminal(),
                ))
            }
        },
    )
}

#[tokio::test]
async fn chunks_emit_accumulated_results_and_state_is_the_result_array() {
    let client = Arc::new(MockGenerator::new(vec![
        terminal_turn(0),
        terminal_turn(1),
        terminal_turn(2),
    ]));
    let def = batch_brain(None);
    let events = cortex::run(&def, RunParams::new(client as Arc<dyn ObjectGenerator>))
        .collect::<Vec<_>>()
        .await;

    let chunks: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::BatchChunkComplete {
                processed,
                total,
                results,
                ..
            } => Some((*processed, *total, results.len())),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![(2, 3, 2), (3, 3, 3)]);

    match &events.last().unwrap().kind {
        EventKind::Complete { final_state } => {
            assert_eq!(
                final_state,
                &json!([
                    {"processed": 0},
                    {"processed": 1},
                    {"processed": 2}
                ])
            );
        }
        other => panic!("expected COMPLETE, got {:?}", other),
    }
}

#[tokio::test]
async fn pause_mid_batch_captures_processed_count_and_resume_finishes() {
    let signals = Arc::new(QueueSignalProvider::new());
    let def = batch_brain(Some((
        Arc::clone(&signals),
        1,
        Arc::new(AtomicBool::new(false)),
    )));
    // only item 0 completes before the pause lands
    let first_client = Arc::new(MockGenerator::new(vec![terminal_turn(0)]));
    let first = cortex::run(
        &def,
        RunParams::new(first_client as Arc<dyn ObjectGenerator>)
            .with_signals(Arc::clone(&signals) as Arc<dyn SignalProvider>),
    )
    .collect::<Vec<_>>()
    .await;

    assert_eq!(first.last().unwrap().kind.name(), "PAUSED");
    let context = match &first.last().unwrap().kind {
        EventKind::Paused { resume_context } => ResumeContext::from_value(resume_context).unwrap(),
        other => panic!("expected PAUSED, got {:?}", other),
    };
    let progress = context.batch.as_ref().expect("batch progress");
    assert_eq!(progress.processed, 1);
    assert_eq!(progress.results.len(), 1);
    assert_eq!(progress.items.len(), 3);

    let resume_client = Arc::new(MockGenerator::new(vec![terminal_turn(1), terminal_turn(2)]));
    let second = cortex::resume_run(
        &def,
        ResumeParams {
            run: RunParams::new(resume_client as Arc<dyn ObjectGenerator>),
            event_log: first,
            resume_context: context,
        },
    )
    .collect::<Vec<_>>()
    .await;

    assert_eq!(second[0].kind.name(), "RESUMED");
    let chunks: Vec<_> = second
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::BatchChunkComplete { processed, .. } => Some(*processed),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![2, 3]);
    match &second.last().unwrap().kind {
        EventKind::Complete { final_state } => {
            assert_eq!(final_state.as_array().unwrap().len(), 3);
        }
        other => panic!("expected COMPLETE, got {:?}", other),
    }
}

#[tokio::test]
async fn kill_mid_batch_cancels_the_run() {
    let signals = Arc::new(QueueSignalProvider::new());
    let killer = Arc::clone(&signals);
    let def = BrainDefinition::new("fanout").batch_agent(
        "process items",
        2,
        None,
        |_ctx| async move { Ok(vec![json!(0), json!(1)]) },
        move |item, _ctx| {
            let signals = Arc::clone(&killer);
            async move {
                if item == json!(1) {
                    signals.queue(Signal::Kill).await;
                }
                Ok(AgentSpec::new("go").tool(
                    "emit",
                    ToolDef::new("emit", json!({"type": "object"})).terminal(),
                ))
            }
        },
    );
    let client = Arc::new(MockGenerator::new(vec![terminal_turn(0)]));
    let events = cortex::run(
        &def,
        RunParams::new(client as Arc<dyn ObjectGenerator>)
            .with_signals(Arc::clone(&signals) as Arc<dyn SignalProvider>),
    )
    .collect::<Vec<_>>()
    .await;
    assert_eq!(events.last().unwrap().kind.name(), "CANCELLED");
    let terminals = events.iter().filter(|e| e.kind.is_terminal()).count();
    assert_eq!(terminals, 1);
}
