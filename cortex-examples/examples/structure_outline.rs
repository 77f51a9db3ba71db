//! Example: render a brain's structure as a text outline and Graphviz DOT.
//!
//! Hosts use the structure tree to show directories and resolve identifiers;
//! this prints both renderings for a brain with a nested child.
//!
//! Run: `cargo run -p cortex-examples --example structure_outline`

use cortex::{generate_dot, generate_text, resolve, AgentSpec, BrainDefinition, StepReturn};
use serde_json::json;

fn main() {
    let research = BrainDefinition::new("research")
        .step("collect sources", |ctx| async move {
            Ok(StepReturn::state(ctx.state))
        })
        .agent_step("summarize findings", |_ctx| async move {
            Ok(AgentSpec::new("summarize"))
        });

    let brain = BrainDefinition::new("weekly post")
        .with_description("writes and publishes the weekly post")
        .nested(
            "research the topic",
            research,
            |parent| parent.clone(),
            |parent, child| {
                let mut merged = parent.clone();
                merged["research"] = child.clone();
                merged
            },
        )
        .step("draft", |_ctx| async move {
            Ok(StepReturn::state(json!({"draft": true})))
        });

    let structure = brain.structure();
    println!("{}", generate_text(&structure));
    println!("{}", generate_dot(&structure));

    let brains = vec![structure];
    println!("resolve(\"weekly\") -> {:?}", resolve(&brains, "weekly"));
}
