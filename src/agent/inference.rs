//! Model access. The orchestrator depends only on the `ModelClient`
//! trait; `InferenceClient` is the OpenAI-compatible HTTP
//! implementation. Model failures are hard run failures and are not
//! retried here.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::error::{AgentError, Result};
use super::types::{ChatMessage, ToolCall};

#[derive(Debug, Clone, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &Value,
    ) -> Result<ModelResponse>;
}

pub struct InferenceClient {
    client: Client,
    base_url: String,
    auth_header: Option<String>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    tools: &'a Value,
    stream: bool,
}

impl InferenceClient {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header: api_key.map(|key| format!("Bearer {}", key.trim())),
        })
    }
}

#[async_trait]
impl ModelClient for InferenceClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &Value,
    ) -> Result<ModelResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Requesting completion from {} (model {})", url, model);

        let mut request = self.client.post(&url).json(&ChatCompletionRequest {
            model,
            messages,
            tools,
            stream: false,
        });
        if let Some(header) = &self.auth_header {
            request = request.header("Authorization", header);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::Model(format!("({}) {}", status, body)));
        }

        Ok(response.json::<ModelResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parses_tool_calls() {
        let raw = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "run_command", "arguments": "{\"command\":\"ls\"}"}
                    }]
                }
            }]
        }"#;
        let parsed: ModelResponse = serde_json::from_str(raw).unwrap();
        let calls = parsed.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "run_command");
    }

    #[test]
    fn response_tolerates_missing_choices() {
        let parsed: ModelResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.choices.is_empty());
    }
}
