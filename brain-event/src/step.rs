//! Serialized step tree: per-step status snapshots emitted as `STEP_STATUS`.

use json_patch::Patch;
use serde::{Deserialize, Serialize};

use crate::structure::{BrainStructure, StepType};

/// Execution status of one step in the serialized tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    Pending,
    Running,
    Complete,
    Error,
    Cancelled,
    Paused,
}

/// One step in a `STEP_STATUS` snapshot.
///
/// The snapshot always lists the top-level steps of the running brain in
/// declared order; a nested brain's child steps appear under `inner_steps`.
/// `patch` is present once the step has completed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedStep {
    pub title: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: StepExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inner_steps: Option<Vec<SerializedStep>>,
}

impl SerializedStep {
    /// Builds an all-pending tree from a brain structure. Used to seed the
    /// step tree at `START` and after `RESUMED` before replayed statuses apply.
    pub fn pending_tree(structure: &BrainStructure) -> Vec<SerializedStep> {
        structure
            .steps
            .iter()
            .map(|node| SerializedStep {
                title: node.title.clone(),
                step_type: node.step_type,
                status: StepExecutionStatus::Pending,
                patch: None,
                inner_steps: node.inner.as_ref().map(|inner| Self::pending_tree(inner)),
            })
            .collect()
    }
}
