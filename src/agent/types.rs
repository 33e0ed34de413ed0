use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in the model's context. The transcript is append-only for
/// the duration of a run; insertion order is what the model sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text("assistant", content)
    }

    /// A `tool`-role message carrying one stringified result, keyed to
    /// the originating call id so the model can correlate it.
    pub fn tool(tool_call_id: &str, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_call_id: Some(tool_call_id.to_string()),
            tool_calls: None,
        }
    }

    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// A tool invocation issued by the model. `arguments` is the
/// JSON-encoded object exactly as produced; decoding happens in the
/// executor so malformed payloads stay recoverable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }
    }
}

/// Exactly one of `result`/`error` is populated on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    Failure { error: String },
    Success { result: Value },
}

impl ToolOutcome {
    pub fn ok(result: Value) -> Self {
        ToolOutcome::Success { result }
    }

    pub fn err(error: impl Into<String>) -> Self {
        ToolOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Failure { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub function_name: String,
    pub result: ToolOutcome,
}

/// Final shape of one orchestration run, streamed or not. `warning` is
/// set on soft termination (iteration cap); `error` only when
/// `success` is false.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub content: String,
    pub session_id: Option<String>,
    pub tool_results: Vec<ToolResult>,
    pub iterations: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_outcome_serializes_exactly_one_field() {
        let ok = serde_json::to_value(ToolOutcome::ok(serde_json::json!("abc"))).unwrap();
        assert_eq!(ok, serde_json::json!({"result": "abc"}));

        let err = serde_json::to_value(ToolOutcome::err("boom")).unwrap();
        assert_eq!(err, serde_json::json!({"error": "boom"}));
    }

    #[test]
    fn tool_result_round_trip_preserves_call_id() {
        let result = ToolResult {
            tool_call_id: "call_42".to_string(),
            function_name: "run_command".to_string(),
            result: ToolOutcome::ok(serde_json::json!({"stdout": "ok"})),
        };

        // The transcript carries the stringified outcome keyed by the
        // originating call id.
        let content = serde_json::to_string(&result.result).unwrap();
        let message = ChatMessage::tool(&result.tool_call_id, content);

        assert_eq!(message.tool_call_id.as_deref(), Some("call_42"));
        let parsed: ToolOutcome = serde_json::from_str(message.content.as_deref().unwrap()).unwrap();
        assert!(!parsed.is_error());
    }

    #[test]
    fn tool_call_defaults_function_kind() {
        let call: ToolCall =
            serde_json::from_str(r#"{"id":"c1","function":{"name":"get_url","arguments":"{}"}}"#)
                .unwrap();
        assert_eq!(call.kind, "function");
        assert_eq!(call.function.name, "get_url");
    }

    #[test]
    fn optional_message_fields_are_omitted() {
        let wire = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(wire, serde_json::json!({"role": "user", "content": "hi"}));
    }
}
