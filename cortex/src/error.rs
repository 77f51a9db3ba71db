//! Engine and step error types.
//!
//! Two families: [`StepFailure`] is the error a user step body or tool returns
//! (serialized into `ERROR` events as `{name, message, stack}`), and
//! [`EngineError`] covers engine-level failures (internal invariant breaks,
//! malformed stored logs) plus the outcomes `BrainRunner` reports.

use brain_event::SerializedError;
use thiserror::Error;

/// Error returned by a user step body, agent body, or tool `execute`.
///
/// Carries the serialized shape emitted on `ERROR` events. Build one with
/// [`StepFailure::new`] or convert from any string-like message; the `name`
/// defaults to `"Error"` in that case.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{name}: {message}")]
pub struct StepFailure {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl StepFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// The wire shape carried on `ERROR` events.
    pub fn serialized(&self) -> SerializedError {
        SerializedError {
            name: self.name.clone(),
            message: self.message.clone(),
            stack: self.stack.clone(),
        }
    }
}

impl From<String> for StepFailure {
    fn from(message: String) -> Self {
        StepFailure::new("Error", message)
    }
}

impl From<&str> for StepFailure {
    fn from(message: &str) -> Self {
        StepFailure::new("Error", message)
    }
}

/// Engine-level error.
///
/// `Internal` covers reducer disagreement on resume, invalid stored patches,
/// and corrupt event logs; it is fatal and surfaces as an `ERROR` event with
/// `name = "EngineInternal"`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Invariant break inside the engine (corrupt log, replay disagreement,
    /// unapplicable stored patch).
    #[error("engine internal: {0}")]
    Internal(String),

    /// The run's event stream ended without a terminal event (the engine task
    /// was dropped or panicked).
    #[error("event stream ended without a terminal event")]
    StreamTruncated,
}

impl EngineError {
    /// The wire shape for `Internal`, carried on `ERROR` events.
    pub fn serialized(&self) -> SerializedError {
        SerializedError::new("EngineInternal", self.to_string())
    }
}
