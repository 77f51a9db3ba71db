//! Run-scoped context passed to every step body.
//!
//! Instead of closures capturing hidden run state, each body receives an
//! explicit [`StepContext`]: the current state, the run options, the injected
//! capabilities, and (on webhook resume) the webhook response. Capabilities
//! are host-provided trait objects; no-op defaults are used when a host
//! injects nothing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Error from a capability lookup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CapabilityError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("capability error: {0}")]
    Other(String),
}

/// Keyed resource loader. Read-mostly; concurrent reads are safe.
#[async_trait]
pub trait Resources: Send + Sync {
    async fn load(&self, key: &str) -> Result<Value, CapabilityError>;
}

/// Page renderer: slug plus params to rendered text.
#[async_trait]
pub trait Pages: Send + Sync {
    async fn render(&self, slug: &str, params: &Value) -> Result<String, CapabilityError>;
}

/// Optional memory capability: save and search keyed entries.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn save(&self, key: &str, entry: &Value) -> Result<(), CapabilityError>;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Value>, CapabilityError>;
}

/// No-op resources: every key is missing.
#[derive(Debug, Default)]
pub struct NoopResources;

#[async_trait]
impl Resources for NoopResources {
    async fn load(&self, key: &str) -> Result<Value, CapabilityError> {
        Err(CapabilityError::NotFound(key.to_string()))
    }
}

/// No-op pages: every slug is missing.
#[derive(Debug, Default)]
pub struct NoopPages;

#[async_trait]
impl Pages for NoopPages {
    async fn render(&self, slug: &str, _params: &Value) -> Result<String, CapabilityError> {
        Err(CapabilityError::NotFound(slug.to_string()))
    }
}

/// Context handed to step bodies, agent bodies, and tool `execute`.
#[derive(Clone)]
pub struct StepContext {
    /// State as of the step boundary. Bodies return the next state; they never
    /// mutate this in place.
    pub state: Value,
    /// Run options validated against the definition's options schema.
    pub options: Value,
    pub resources: Arc<dyn Resources>,
    pub pages: Arc<dyn Pages>,
    pub env: Arc<HashMap<String, String>>,
    pub memory: Option<Arc<dyn MemoryProvider>>,
    /// Webhook reply, set only when re-running a body after webhook resume.
    pub response: Option<Value>,
    pub brain_run_id: String,
}

impl StepContext {
    /// Context with no-op capabilities; the engine builds these per run and
    /// swaps in host-provided implementations where present.
    pub fn new(state: Value, options: Value, brain_run_id: impl Into<String>) -> Self {
        Self {
            state,
            options,
            resources: Arc::new(NoopResources),
            pages: Arc::new(NoopPages),
            env: Arc::new(HashMap::new()),
            memory: None,
            response: None,
            brain_run_id: brain_run_id.into(),
        }
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("state", &self.state)
            .field("options", &self.options)
            .field("response", &self.response)
            .field("brain_run_id", &self.brain_run_id)
            .finish()
    }
}
