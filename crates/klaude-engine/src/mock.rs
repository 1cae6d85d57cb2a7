//! Deterministic model client for tests and offline runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use klaude_core::model::{ChatMessage, ModelClient, ModelReply, ToolCallRequest};
use klaude_core::tools::ToolDefinition;
use klaude_core::{ModelError, ToolCallId};
use parking_lot::Mutex;

/// One pre-programmed answer.
#[derive(Clone, Debug)]
pub enum MockResponse {
    Reply(ModelReply),
    Error(ModelError),
    /// Wait, then answer with the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Reply(ModelReply::text(text))
    }

    /// A reply requesting the given `(call id, tool name, args)` calls.
    pub fn tools(calls: Vec<(&str, &str, serde_json::Value)>) -> Self {
        Self::Reply(ModelReply::tool_calls(
            calls
                .into_iter()
                .map(|(id, name, arguments)| ToolCallRequest {
                    id: ToolCallId::from_raw(id),
                    name: name.to_string(),
                    arguments,
                })
                .collect(),
        ))
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Answers from per-conversation scripts.
///
/// A conversation is identified by its first user message, so a sub-agent
/// (whose conversation starts with its own prompt) follows its own script even
/// while other conversations call the model concurrently. Conversations with no
/// script of their own draw from the default script.
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    default: Mutex<VecDeque<MockResponse>>,
    call_count: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            default: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    /// Script the conversation whose first user message is `prompt`.
    pub fn with_script(self, prompt: &str, responses: Vec<MockResponse>) -> Self {
        self.scripts.lock().insert(prompt.to_string(), responses.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    fn next_response(&self, messages: &[ChatMessage]) -> Option<MockResponse> {
        let first_prompt = messages.iter().find_map(|m| match m {
            ChatMessage::User { content } => Some(content.as_str()),
            _ => None,
        });
        if let Some(prompt) = first_prompt {
            if let Some(script) = self.scripts.lock().get_mut(prompt) {
                return script.pop_front();
            }
        }
        self.default.lock().pop_front()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ModelReply, ModelError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        let mut current = self
            .next_response(messages)
            .ok_or(ModelError::ScriptExhausted(idx))?;
        loop {
            match current {
                MockResponse::Reply(reply) => return Ok(reply),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}
