//! Static contract the model is allowed to invoke. Registry membership
//! is the sole authorization check: a name that is not listed here is
//! rejected before any side effect happens.

use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON-Schema object describing the parameters.
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Declaration order is preserved; it is the order the model sees the
/// tools in and the order `names()` reports for error messages.
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// The builtin tool set. `session_id` is declared on every tool
    /// except `create_environment`, even though the executor always
    /// overrides whatever value the model supplies for it.
    pub fn builtin() -> Self {
        let tools = vec![
            ToolSpec::new(
                "create_environment",
                "Create a new sandboxed development environment. Use this once at the \
                 start of a session, before any other tool. Returns the session_id used \
                 by all subsequent tools.",
                json!({
                    "type": "object",
                    "properties": {
                        "image": {
                            "type": "string",
                            "description": "Sandbox image to use; omit for the default"
                        },
                        "name": {
                            "type": "string",
                            "description": "Name for the sandbox instance"
                        }
                    },
                    "required": []
                }),
            ),
            ToolSpec::new(
                "run_command",
                "Execute a shell command in the sandbox. The environment resets between \
                 commands, so combine related commands with && or ;",
                json!({
                    "type": "object",
                    "properties": {
                        "session_id": {
                            "type": "string",
                            "description": "The session ID of the sandbox"
                        },
                        "command": {
                            "type": "string",
                            "description": "The shell command to execute"
                        },
                        "timeout_secs": {
                            "type": "integer",
                            "description": "Optional command timeout in seconds"
                        }
                    },
                    "required": ["session_id", "command"]
                }),
            ),
            ToolSpec::new(
                "read_file",
                "Read the contents of a file in the sandbox. Use this before modifying \
                 files to understand their current content.",
                json!({
                    "type": "object",
                    "properties": {
                        "session_id": {
                            "type": "string",
                            "description": "The session ID of the sandbox"
                        },
                        "path": {
                            "type": "string",
                            "description": "Full path to the file"
                        }
                    },
                    "required": ["session_id", "path"]
                }),
            ),
            ToolSpec::new(
                "write_file",
                "Create or overwrite a file with the provided content.",
                json!({
                    "type": "object",
                    "properties": {
                        "session_id": {
                            "type": "string",
                            "description": "The session ID of the sandbox"
                        },
                        "path": {
                            "type": "string",
                            "description": "Full path to the file to create or overwrite"
                        },
                        "content": {
                            "type": "string",
                            "description": "The complete content to write to the file"
                        }
                    },
                    "required": ["session_id", "path", "content"]
                }),
            ),
            ToolSpec::new(
                "get_url",
                "Get the public URL of the sandbox. Only useful after a port has been \
                 exposed.",
                json!({
                    "type": "object",
                    "properties": {
                        "session_id": {
                            "type": "string",
                            "description": "The session ID of the sandbox"
                        }
                    },
                    "required": ["session_id"]
                }),
            ),
            ToolSpec::new(
                "expose_port",
                "Expose a port on the sandbox to make it accessible from the internet. \
                 Required before starting web servers.",
                json!({
                    "type": "object",
                    "properties": {
                        "session_id": {
                            "type": "string",
                            "description": "The session ID of the sandbox"
                        },
                        "port": {
                            "type": "integer",
                            "description": "The port number to expose (usually 80 for web apps)"
                        }
                    },
                    "required": ["session_id", "port"]
                }),
            ),
            ToolSpec::new(
                "start_app",
                "Start the application dev server and expose it externally. Run this \
                 ONLY ONCE after all files are created. Returns the public URL.",
                json!({
                    "type": "object",
                    "properties": {
                        "session_id": {
                            "type": "string",
                            "description": "The session ID of the sandbox"
                        }
                    },
                    "required": ["session_id"]
                }),
            ),
        ];

        Self { tools }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Error text for a name the model invented. Enumerates the valid
    /// alternatives so the model can self-correct on its next turn.
    pub fn unknown_tool_error(&self, name: &str) -> String {
        format!(
            "Unknown function: {}. Available tools are: {}",
            name,
            self.names().join(", ")
        )
    }

    /// Administrative registration, for use before a run starts. An
    /// existing entry with the same name is replaced.
    pub fn register(&mut self, spec: ToolSpec) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name == spec.name) {
            *existing = spec;
        } else {
            self.tools.push(spec);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<ToolSpec> {
        let index = self.tools.iter().position(|t| t.name == name)?;
        Some(self.tools.remove(index))
    }

    /// OpenAI-style tool schema array for the chat completions payload.
    pub fn schemas(&self) -> Value {
        Value::Array(
            self.tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect(),
        )
    }
}
