//! JSON-Patch engine: RFC 6902 apply/diff over `serde_json::Value` state.
//!
//! Thin wrapper over the `json-patch` crate. `diff` produces the forward
//! patch recorded on `STEP_COMPLETE`; `apply` replays stored patches during
//! resume. All six RFC 6902 ops (`add`, `remove`, `replace`, `move`, `copy`,
//! `test`) are supported by `apply`; `diff` emits `add`/`remove`/`replace`.

use json_patch::Patch;
use serde_json::Value;
use thiserror::Error;

/// Error applying a patch to a state value.
#[derive(Debug, Error)]
#[error("patch apply failed: {0}")]
pub struct PatchApplyError(String);

/// Applies an RFC 6902 patch to `state`, returning the new state.
///
/// The input state is not mutated; an empty patch is the identity. A failure
/// (bad pointer, failed `test`) leaves no partial application visible to the
/// caller.
pub fn apply(state: &Value, patch: &Patch) -> Result<Value, PatchApplyError> {
    let mut next = state.clone();
    json_patch::patch(&mut next, patch).map_err(|e| PatchApplyError(e.to_string()))?;
    Ok(next)
}

/// Computes the forward patch from `old` to `new`.
pub fn diff(old: &Value, new: &Value) -> Patch {
    json_patch::diff(old, new)
}

/// Deep-clones a state value.
pub fn deep_clone(state: &Value) -> Value {
    state.clone()
}

/// The empty patch (identity).
pub fn empty() -> Patch {
    Patch(Vec::new())
}
