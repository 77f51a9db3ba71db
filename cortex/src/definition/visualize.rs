//! Brain structure rendering.
//!
//! Exports a [`BrainStructure`] as Graphviz DOT (for rendering with dot
//! tooling) or as an indented text outline (for host directory listings).

use std::fmt::Write;

use brain_event::{BrainStructure, StepType};

fn type_label(step_type: StepType) -> &'static str {
    match step_type {
        StepType::Plain => "step",
        StepType::Agent => "agent",
        StepType::Brain => "brain",
        StepType::BatchAgent => "batch",
    }
}

/// Generates a Graphviz DOT rendering of a brain: steps in declared order,
/// nested brains as subgraph clusters.
pub fn generate_dot(structure: &BrainStructure) -> String {
    let mut dot = String::from("digraph {\n");
    dot.push_str("  rankdir=LR;\n");
    dot.push_str("  node [shape=box];\n\n");
    let mut cluster = 0usize;
    write_dot_level(&mut dot, structure, "", &mut cluster);
    dot.push_str("}\n");
    dot
}

fn write_dot_level(dot: &mut String, structure: &BrainStructure, prefix: &str, cluster: &mut usize) {
    let mut previous: Option<String> = None;
    for (index, node) in structure.steps.iter().enumerate() {
        let id = format!("{}{}", prefix, index);
        dot.push_str(&format!(
            "  \"{}\" [label=\"{} ({})\"];\n",
            id,
            node.title,
            type_label(node.step_type)
        ));
        if let Some(prev) = &previous {
            dot.push_str(&format!("  \"{}\" -> \"{}\";\n", prev, id));
        }
        if let Some(inner) = &node.inner {
            *cluster += 1;
            dot.push_str(&format!("  subgraph cluster_{} {{\n", cluster));
            dot.push_str(&format!("    label=\"{}\";\n", inner.title));
            write_dot_level(dot, inner, &format!("{}.", id), cluster);
            dot.push_str("  }\n");
        }
        previous = Some(id);
    }
}

/// Generates an indented text outline of a brain's steps.
pub fn generate_text(structure: &BrainStructure) -> String {
    let mut text = String::new();
    writeln!(text, "{}", structure.title).ok();
    if let Some(description) = &structure.description {
        writeln!(text, "  {}", description).ok();
    }
    write_text_level(&mut text, structure, 1);
    text
}

fn write_text_level(text: &mut String, structure: &BrainStructure, depth: usize) {
    let indent = "  ".repeat(depth);
    for (index, node) in structure.steps.iter().enumerate() {
        writeln!(
            text,
            "{}{}. {} [{}]",
            indent,
            index + 1,
            node.title,
            type_label(node.step_type)
        )
        .ok();
        if let Some(inner) = &node.inner {
            write_text_level(text, inner, depth + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{BrainDefinition, StepReturn};
    use serde_json::json;

    fn sample() -> BrainStructure {
        let child = BrainDefinition::new("research").step("gather", |ctx| async move {
            Ok(StepReturn::state(ctx.state))
        });
        BrainDefinition::new("publisher")
            .with_description("writes the weekly post")
            .step("draft", |_ctx| async move {
                Ok(StepReturn::state(json!({})))
            })
            .nested(
                "research first",
                child,
                |parent| parent.clone(),
                |_parent, child| child.clone(),
            )
            .structure()
    }

    /// **Scenario**: DOT output names every step, chains them in order, and
    /// clusters the nested brain.
    #[test]
    fn dot_contains_steps_edges_and_cluster() {
        let dot = generate_dot(&sample());
        assert!(dot.contains("digraph"));
        assert!(dot.contains("draft (step)"));
        assert!(dot.contains("research first (brain)"));
        assert!(dot.contains("\"0\" -> \"1\""));
        assert!(dot.contains("subgraph cluster_1"));
        assert!(dot.contains("gather (step)"));
    }

    /// **Scenario**: The text outline numbers steps and indents nested brains.
    #[test]
    fn text_outline_numbers_and_indents() {
        let text = generate_text(&sample());
        assert!(text.starts_with("publisher\n"));
        assert!(text.contains("writes the weekly post"));
        assert!(text.contains("  1. draft [step]"));
        assert!(text.contains("  2. research first [brain]"));
        assert!(text.contains("    1. gather [step]"));
    }
}
