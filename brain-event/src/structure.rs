//! Static brain structure: the recursive `{title, steps}` tree hosts use to
//! render directories and resolve identifiers. Produced by the definition
//! builder and carried on `START` so watchers can seed a pending step tree.

use serde::{Deserialize, Serialize};

/// Kind of one step definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Plain,
    Agent,
    Brain,
    BatchAgent,
}

/// Recursive description of a brain: title, optional description, and the
/// declared steps in order. Nested brains carry their child structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrainStructure {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<StepNode>,
}

/// One step entry in a [`BrainStructure`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepNode {
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner: Option<BrainStructure>,
}
