//! Mock generator for tests and examples.
//!
//! Plays back a scripted sequence of [`GeneratedText`] turns, one per
//! `generate_text` call, and records every request so tests can assert on the
//! conversation the loop handed to the model. A call past the end of the
//! script fails, which surfaces runaway loops in tests instead of hanging.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    ChatMessage, GenerateObjectRequest, GenerateTextRequest, GeneratedObject, GeneratedText,
    GeneratorError, ObjectGenerator, TokenUsage, ToolCallRequest,
};

/// One recorded `generate_text` request: the system prompt and conversation.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// Scripted [`ObjectGenerator`]: returns pre-built turns in order.
///
/// Build turns with [`MockGenerator::text_turn`] and
/// [`MockGenerator::tool_call_turn`], or construct [`GeneratedText`] directly
/// for full control (usage, raw response messages).
pub struct MockGenerator {
    script: Mutex<std::collections::VecDeque<GeneratedText>>,
    requests: Mutex<Vec<RecordedRequest>>,
    object: Option<Value>,
}

impl MockGenerator {
    /// A generator that plays the given turns in order.
    pub fn new(turns: Vec<GeneratedText>) -> Self {
        Self {
            script: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            object: None,
        }
    }

    /// Single text-only turn.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![Self::text_turn(text)])
    }

    /// Sets the object returned by every `generate_object` call.
    pub fn with_object(mut self, object: Value) -> Self {
        self.object = Some(object);
        self
    }

    /// A text-only turn with 10 tokens of usage.
    pub fn text_turn(text: impl Into<String>) -> GeneratedText {
        let text = text.into();
        GeneratedText {
            response_messages: vec![serde_json::json!({
                "role": "assistant",
                "content": text.clone(),
            })],
            text: Some(text),
            tool_calls: Vec::new(),
            usage: TokenUsage { total_tokens: 10 },
        }
    }

    /// A turn that calls one tool, with 10 tokens of usage.
    pub fn tool_call_turn(
        id: impl Into<String>,
        name: impl Into<String>,
        args: Value,
    ) -> GeneratedText {
        let call = ToolCallRequest {
            tool_call_id: id.into(),
            tool_name: name.into(),
            args,
        };
        GeneratedText {
            text: None,
            response_messages: vec![serde_json::json!({
                "role": "assistant",
                "tool_calls": [{
                    "id": call.tool_call_id.clone(),
                    "name": call.tool_name.clone(),
                    "args": call.args.clone(),
                }],
            })],
            tool_calls: vec![call],
            usage: TokenUsage { total_tokens: 10 },
        }
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ObjectGenerator for MockGenerator {
    async fn generate_text(
        &self,
        request: GenerateTextRequest,
    ) -> Result<GeneratedText, GeneratorError> {
        if request.cancel.is_cancelled() {
            return Err(GeneratorError::Cancelled);
        }
        self.requests.lock().expect("requests lock").push(RecordedRequest {
            system: request.system.clone(),
            messages: request.messages.clone(),
        });
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .ok_or_else(|| GeneratorError::Failed("mock script exhausted".into()))
    }

    async fn generate_object(
        &self,
        request: GenerateObjectRequest,
    ) -> Result<GeneratedObject, GeneratorError> {
        if request.cancel.is_cancelled() {
            return Err(GeneratorError::Cancelled);
        }
        match &self.object {
            Some(object) => Ok(GeneratedObject {
                object: object.clone(),
                usage: TokenUsage { total_tokens: 10 },
            }),
            None => Err(GeneratorError::Failed("no scripted object".into())),
        }
    }
}
