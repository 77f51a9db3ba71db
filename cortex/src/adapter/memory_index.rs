//! Memory-indexing adapter: feeds conversation traffic into a memory
//! provider as it streams by.
//!
//! Indexes user messages, assistant messages, and terminal results under
//! `<run id>/<seq>` keys so a memory capability injected into later runs can
//! recall earlier conversations. Like every adapter, indexing failures are
//! reported upward and swallowed by the fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use brain_event::{BrainEvent, EventKind};
use serde_json::json;

use super::{Adapter, AdapterError};
use crate::context::MemoryProvider;

/// Saves agent conversation events into a [`MemoryProvider`].
pub struct MemoryIndexingAdapter {
    memory: Arc<dyn MemoryProvider>,
}

impl MemoryIndexingAdapter {
    pub fn new(memory: Arc<dyn MemoryProvider>) -> Self {
        Self { memory }
    }

    fn entry_for(event: &BrainEvent) -> Option<serde_json::Value> {
        match &event.kind {
            EventKind::AgentUserMessage { content } => Some(json!({
                "role": "user",
                "content": content,
            })),
            EventKind::AgentAssistantMessage { content } => Some(json!({
                "role": "assistant",
                "content": content,
            })),
            EventKind::AgentComplete {
                result,
                terminal_tool_name,
            } => Some(json!({
                "role": "result",
                "tool": terminal_tool_name,
                "content": result,
            })),
            _ => None,
        }
    }
}

#[async_trait]
impl Adapter for MemoryIndexingAdapter {
    async fn dispatch(&self, event: &BrainEvent) -> Result<(), AdapterError> {
        let Some(entry) = Self::entry_for(event) else {
            return Ok(());
        };
        let key = format!("{}/{}", event.brain_run_id, event.seq);
        self.memory
            .save(&key, &entry)
            .await
            .map_err(|e| AdapterError(e.to_string()))
    }
}
