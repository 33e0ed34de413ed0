//! Scripted model for tests and local dry runs: replies are queued up
//! front, every received transcript is recorded, and an optional
//! repeat mode replays the last reply forever (a model that never
//! stops asking for tools).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::error::{AgentError, Result};
use super::inference::{Choice, ChoiceMessage, ModelClient, ModelResponse};
use super::types::{ChatMessage, ToolCall};

#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<ModelResponse>>,
    transcripts: Mutex<Vec<Vec<ChatMessage>>>,
    repeat_last: bool,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            transcripts: Mutex::new(Vec::new()),
            repeat_last: false,
        }
    }

    /// Replays `reply` on every call, forever.
    pub fn repeating(reply: ModelResponse) -> Self {
        Self {
            script: Mutex::new(vec![reply].into()),
            transcripts: Mutex::new(Vec::new()),
            repeat_last: true,
        }
    }

    /// Number of completions served so far.
    pub fn calls(&self) -> usize {
        self.transcripts.lock().unwrap().len()
    }

    /// The transcript received on the n-th call (0-based).
    pub fn transcript(&self, n: usize) -> Option<Vec<ChatMessage>> {
        self.transcripts.lock().unwrap().get(n).cloned()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        _tools: &Value,
    ) -> Result<ModelResponse> {
        self.transcripts.lock().unwrap().push(messages.to_vec());

        let mut script = self.script.lock().unwrap();
        if self.repeat_last {
            return script
                .front()
                .cloned()
                .ok_or_else(|| AgentError::Model("scripted model has no reply".to_string()));
        }
        script
            .pop_front()
            .ok_or_else(|| AgentError::Model("scripted model is out of replies".to_string()))
    }
}

/// A final-answer reply with no tool calls.
pub fn text_reply(content: &str) -> ModelResponse {
    ModelResponse {
        choices: vec![Choice {
            message: ChoiceMessage {
                content: Some(content.to_string()),
                tool_calls: None,
            },
        }],
    }
}

/// A reply requesting the given `(id, name, arguments)` tool calls.
pub fn tool_reply(calls: &[(&str, &str, &str)]) -> ModelResponse {
    ModelResponse {
        choices: vec![Choice {
            message: ChoiceMessage {
                content: None,
                tool_calls: Some(
                    calls
                        .iter()
                        .map(|(id, name, args)| ToolCall::new(id, name, args))
                        .collect(),
                ),
            },
        }],
    }
}

/// A degenerate reply with no choices at all.
pub fn empty_reply() -> ModelResponse {
    ModelResponse { choices: vec![] }
}
