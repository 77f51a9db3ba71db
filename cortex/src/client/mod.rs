//! LLM client abstraction consumed by the agent loop.
//!
//! The engine depends on a single [`ObjectGenerator`] contract: text
//! generation with tool definitions, schema-constrained object generation,
//! and optional token streaming. Implementations wrap a concrete provider;
//! [`MockGenerator`] ships in-crate for tests and examples.
//!
//! # Cancellation
//!
//! Every request carries a `CancellationToken`. When the engine sees a KILL
//! while a call is in flight it cancels the token and abandons the call;
//! implementations must observe the token and return promptly. Partial output
//! from a cancelled call is never emitted.

mod mock;

pub use mock::{MockGenerator, RecordedRequest};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Role of one conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
}

/// One conversation message handed to `generate_text`.
///
/// Assistant messages may carry `tool_calls`; tool results are messages with
/// `Role::Tool` and the originating `tool_call_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, result: &Value) -> Self {
        Self {
            role: Role::Tool,
            content: result.to_string(),
            tool_call_id: Some(tool_call_id.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Token usage for one call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_tokens: u64,
}

/// A tool made visible to the model: name, description, input schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Request for one text-generation turn.
#[derive(Clone, Debug)]
pub struct GenerateTextRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDescriptor>,
    pub cancel: CancellationToken,
}

/// Response from one text-generation turn.
#[derive(Clone, Debug, Default)]
pub struct GeneratedText {
    /// Plain assistant text, when any.
    pub text: Option<String>,
    /// Tool invocations in the order the model produced them.
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: TokenUsage,
    /// Provider response messages, kept opaque; each is emitted as an
    /// `AGENT_RAW_RESPONSE_MESSAGE`.
    pub response_messages: Vec<Value>,
}

/// Request for schema-constrained object generation.
#[derive(Clone, Debug)]
pub struct GenerateObjectRequest {
    pub schema: Value,
    pub messages: Vec<ChatMessage>,
    pub cancel: CancellationToken,
}

/// Response from object generation.
#[derive(Clone, Debug)]
pub struct GeneratedObject {
    pub object: Value,
    pub usage: TokenUsage,
}

/// One streamed text chunk.
#[derive(Clone, Debug)]
pub struct TextChunk {
    pub content: String,
}

/// Error from a generator call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GeneratorError {
    /// The injected cancel token fired.
    #[error("generation cancelled")]
    Cancelled,
    #[error("generation failed: {0}")]
    Failed(String),
}

/// LLM client contract consumed by the agent loop.
///
/// `generate_text` is the workhorse; `generate_object` backs schema-shaped
/// outputs; `stream_text` is optional and defaults to a single-chunk delegate
/// of `generate_text`.
#[async_trait]
pub trait ObjectGenerator: Send + Sync {
    async fn generate_text(
        &self,
        request: GenerateTextRequest,
    ) -> Result<GeneratedText, GeneratorError>;

    async fn generate_object(
        &self,
        request: GenerateObjectRequest,
    ) -> Result<GeneratedObject, GeneratorError>;

    /// Streaming variant: when `chunk_tx` is `Some`, implementations send
    /// [`TextChunk`]s as tokens arrive and still return the complete response.
    ///
    /// Default implementation calls `generate_text` and sends the full text as
    /// one chunk.
    async fn stream_text(
        &self,
        request: GenerateTextRequest,
        chunk_tx: Option<mpsc::Sender<TextChunk>>,
    ) -> Result<GeneratedText, GeneratorError> {
        let response = self.generate_text(request).await?;
        if let (Some(tx), Some(text)) = (chunk_tx, response.text.as_ref()) {
            if !text.is_empty() {
                let _ = tx
                    .send(TextChunk {
                        content: text.clone(),
                    })
                    .await;
            }
        }
        Ok(response)
    }
}
