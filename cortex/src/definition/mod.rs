//! Brain definitions: ordered step lists built by a fluent builder.
//!
//! A [`BrainDefinition`] is an immutable, reusable description of a brain:
//! title, optional description, ordered [`StepDef`]s, and an optional options
//! schema enforced at run start. Builder methods consume the definition and
//! return a new one, so definitions can be extended and shared freely; step
//! bodies are `Arc`'d closures and cloning a definition is cheap.
//!
//! # Step shapes
//!
//! - `step`: deterministic body, `StepContext` in, [`StepReturn`] out.
//! - `agent_step`: body produces an [`AgentSpec`]; the engine drives the LLM
//!   loop until a terminal tool fires.
//! - `nested`: a child brain with `adapt_state` / `merge_state` at the seam.
//! - `batch_agent`: an item list fanned through the agent loop in chunks.

mod resolve;
mod validate;
mod visualize;

pub use resolve::{resolve, Resolution};
pub use validate::validate_against;
pub use visualize::{generate_dot, generate_text};

use std::future::Future;
use std::sync::Arc;

use brain_event::{BrainStructure, StepNode, StepType, WebhookRegistration};
use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::context::StepContext;
use crate::error::StepFailure;

/// Future type returned by boxed step bodies.
pub type BodyFuture<T> = BoxFuture<'static, Result<T, StepFailure>>;

/// Boxed plain-step body.
pub type StepFn = Arc<dyn Fn(StepContext) -> BodyFuture<StepReturn> + Send + Sync>;
/// Boxed agent-step body (produces the spec, not the result).
pub type AgentBodyFn = Arc<dyn Fn(StepContext) -> BodyFuture<AgentSpec> + Send + Sync>;
/// Boxed batch item producer.
pub type BatchItemsFn = Arc<dyn Fn(StepContext) -> BodyFuture<Vec<Value>> + Send + Sync>;
/// Boxed per-item agent-spec body for batch steps.
pub type BatchBodyFn = Arc<dyn Fn(Value, StepContext) -> BodyFuture<AgentSpec> + Send + Sync>;
/// Boxed tool executor.
pub type ToolFn = Arc<dyn Fn(Value, StepContext) -> BodyFuture<ToolReturn> + Send + Sync>;
/// Parent state → child state at a nested-brain seam.
pub type AdaptStateFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
/// (parent, child final) → parent state at a nested-brain seam.
pub type MergeStateFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// Value returned by a plain step body.
///
/// `webhooks` non-empty suspends the run until the matching response arrives;
/// `halt` completes the level early with this state.
#[derive(Clone, Debug)]
pub struct StepReturn {
    pub state: Value,
    pub webhooks: Vec<WebhookRegistration>,
    pub halt: bool,
}

impl StepReturn {
    pub fn state(state: Value) -> Self {
        Self {
            state,
            webhooks: Vec::new(),
            halt: false,
        }
    }

    /// Completes the level early with this state.
    pub fn halt(state: Value) -> Self {
        Self {
            state,
            webhooks: Vec::new(),
            halt: true,
        }
    }

    pub fn with_webhooks(mut self, webhooks: Vec<WebhookRegistration>) -> Self {
        self.webhooks = webhooks;
        self
    }
}

impl From<Value> for StepReturn {
    fn from(state: Value) -> Self {
        StepReturn::state(state)
    }
}

/// Result of a tool execution: a value, or webhooks to wait on.
#[derive(Clone, Debug)]
pub enum ToolReturn {
    Value(Value),
    WaitFor(Vec<WebhookRegistration>),
}

/// One tool visible to the agent loop.
///
/// A `terminal` tool ends the loop; its (schema-validated) input becomes the
/// step's result state and `execute` is never called for it.
#[derive(Clone)]
pub struct ToolDef {
    pub description: String,
    pub input_schema: Value,
    pub execute: Option<ToolFn>,
    pub terminal: bool,
}

impl ToolDef {
    pub fn new(description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            description: description.into(),
            input_schema,
            execute: None,
            terminal: false,
        }
    }

    pub fn executes<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value, StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolReturn, StepFailure>> + Send + 'static,
    {
        self.execute = Some(Arc::new(move |input, ctx| Box::pin(f(input, ctx))));
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

impl std::fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDef")
            .field("description", &self.description)
            .field("terminal", &self.terminal)
            .field("has_execute", &self.execute.is_some())
            .finish()
    }
}

/// Agent loop parameters produced by an agent step body.
#[derive(Clone, Debug)]
pub struct AgentSpec {
    pub prompt: String,
    pub system: Option<String>,
    /// Tools in declaration order; order is preserved in model requests.
    pub tools: Vec<(String, ToolDef)>,
    pub max_iterations: Option<u32>,
    pub max_tokens: Option<u64>,
}

impl AgentSpec {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            tools: Vec::new(),
            max_iterations: None,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn tool(mut self, name: impl Into<String>, def: ToolDef) -> Self {
        self.tools.push((name.into(), def));
        self
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_max_tokens(mut self, n: u64) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn find_tool(&self, name: &str) -> Option<&ToolDef> {
        self.tools
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, def)| def)
    }

    /// Descriptors handed to `generate_text`.
    pub fn descriptors(&self) -> Vec<crate::client::ToolDescriptor> {
        self.tools
            .iter()
            .map(|(name, def)| crate::client::ToolDescriptor {
                name: name.clone(),
                description: def.description.clone(),
                input_schema: def.input_schema.clone(),
            })
            .collect()
    }
}

/// One step definition, tagged by shape.
#[derive(Clone)]
pub enum StepDef {
    Plain {
        title: String,
        body: StepFn,
    },
    Agent {
        title: String,
        body: AgentBodyFn,
    },
    NestedBrain {
        title: String,
        child: Arc<BrainDefinition>,
        adapt_state: AdaptStateFn,
        merge_state: MergeStateFn,
    },
    BatchAgent {
        title: String,
        items: BatchItemsFn,
        chunk_size: usize,
        /// Optional schema each item result must satisfy.
        schema: Option<Value>,
        body: BatchBodyFn,
    },
}

impl StepDef {
    pub fn title(&self) -> &str {
        match self {
            StepDef::Plain { title, .. }
            | StepDef::Agent { title, .. }
            | StepDef::NestedBrain { title, .. }
            | StepDef::BatchAgent { title, .. } => title,
        }
    }

    pub fn step_type(&self) -> StepType {
        match self {
            StepDef::Plain { .. } => StepType::Plain,
            StepDef::Agent { .. } => StepType::Agent,
            StepDef::NestedBrain { .. } => StepType::Brain,
            StepDef::BatchAgent { .. } => StepType::BatchAgent,
        }
    }
}

impl std::fmt::Debug for StepDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDef")
            .field("type", &self.step_type())
            .field("title", &self.title().to_string())
            .finish()
    }
}

/// Immutable, reusable brain description.
#[derive(Clone)]
pub struct BrainDefinition {
    title: String,
    description: Option<String>,
    steps: Vec<StepDef>,
    options_schema: Option<Value>,
}

impl BrainDefinition {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            steps: Vec::new(),
            options_schema: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Schema the run-time options object must satisfy; enforced before
    /// `START` is emitted.
    pub fn with_options_schema(mut self, schema: Value) -> Self {
        self.options_schema = Some(schema);
        self
    }

    /// Appends a deterministic step.
    pub fn step<F, Fut>(mut self, title: impl Into<String>, body: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepReturn, StepFailure>> + Send + 'static,
    {
        self.steps.push(StepDef::Plain {
            title: title.into(),
            body: Arc::new(move |ctx| Box::pin(body(ctx))),
        });
        self
    }

    /// Appends an agent step; the body produces the [`AgentSpec`] the engine
    /// loops over.
    pub fn agent_step<F, Fut>(mut self, title: impl Into<String>, body: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AgentSpec, StepFailure>> + Send + 'static,
    {
        self.steps.push(StepDef::Agent {
            title: title.into(),
            body: Arc::new(move |ctx| Box::pin(body(ctx))),
        });
        self
    }

    /// Appends a nested brain with state adapters at the seam.
    pub fn nested<A, M>(
        mut self,
        title: impl Into<String>,
        child: BrainDefinition,
        adapt_state: A,
        merge_state: M,
    ) -> Self
    where
        A: Fn(&Value) -> Value + Send + Sync + 'static,
        M: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.steps.push(StepDef::NestedBrain {
            title: title.into(),
            child: Arc::new(child),
            adapt_state: Arc::new(adapt_state),
            merge_state: Arc::new(merge_state),
        });
        self
    }

    /// Appends a batch agent step: `items` produces the work list, `body`
    /// produces an agent spec per item, and results are reported per chunk.
    pub fn batch_agent<I, IFut, B, BFut>(
        mut self,
        title: impl Into<String>,
        chunk_size: usize,
        schema: Option<Value>,
        items: I,
        body: B,
    ) -> Self
    where
        I: Fn(StepContext) -> IFut + Send + Sync + 'static,
        IFut: Future<Output = Result<Vec<Value>, StepFailure>> + Send + 'static,
        B: Fn(Value, StepContext) -> BFut + Send + Sync + 'static,
        BFut: Future<Output = Result<AgentSpec, StepFailure>> + Send + 'static,
    {
        self.steps.push(StepDef::BatchAgent {
            title: title.into(),
            items: Arc::new(move |ctx| Box::pin(items(ctx))),
            chunk_size: chunk_size.max(1),
            schema,
            body: Arc::new(move |item, ctx| Box::pin(body(item, ctx))),
        });
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn steps(&self) -> &[StepDef] {
        &self.steps
    }

    pub fn options_schema(&self) -> Option<&Value> {
        self.options_schema.as_ref()
    }

    /// Recursive structure tree used by hosts for directories and
    /// identifier resolution, and carried on `START`.
    pub fn structure(&self) -> BrainStructure {
        BrainStructure {
            title: self.title.clone(),
            description: self.description.clone(),
            steps: self
                .steps
                .iter()
                .map(|step| StepNode {
                    step_type: step.step_type(),
                    title: step.title().to_string(),
                    inner: match step {
                        StepDef::NestedBrain { child, .. } => Some(child.structure()),
                        _ => None,
                    },
                })
                .collect(),
        }
    }

    /// Validates run options against the options schema, when one is set.
    pub fn validate_options(&self, options: &Value) -> Result<(), StepFailure> {
        match &self.options_schema {
            Some(schema) => validate_against(schema, options, "options"),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for BrainDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrainDefinition")
            .field("title", &self.title)
            .field("steps", &self.steps)
            .finish()
    }
}
