//! Schema validation for run options and tool inputs.
//!
//! Schemas are user-supplied JSON Schema documents (the options schema on a
//! definition, `input_schema` on tools, the per-item schema on batch steps).
//! Failures surface as `ValidationError`-named step failures per the error
//! taxonomy.

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::error::StepFailure;

/// Validates `instance` against `schema`; `what` names the validated object
/// in error messages ("options", "tool input", ...).
pub fn validate_against(schema: &Value, instance: &Value, what: &str) -> Result<(), StepFailure> {
    let compiled = JSONSchema::compile(schema).map_err(|e| {
        StepFailure::new("ValidationError", format!("invalid {} schema: {}", what, e))
    })?;
    if let Err(errors) = compiled.validate(instance) {
        let detail = errors
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(StepFailure::new(
            "ValidationError",
            format!("{} invalid: {}", what, detail),
        ));
    }
    Ok(())
}
