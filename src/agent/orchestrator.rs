//! The bounded tool-use loop around one chat turn. One run owns its
//! transcript, counters, and accumulator exclusively; the only shared
//! resource is the log hub inside the executor.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use super::executor::ToolExecutor;
use super::heuristics::{decide_continue, NUDGE_MESSAGE};
use super::inference::ModelClient;
use super::registry::ToolRegistry;
use super::stream::AgentEvent;
use super::types::{ChatMessage, RunOutcome, ToolResult};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub max_iterations: u32,
    /// Iterations with at least one failed tool call before the run is
    /// aborted; checked before each model call.
    pub max_consecutive_errors: u32,
    /// How many of the most recent tool results the continuation
    /// heuristic inspects.
    pub recent_tool_window: usize,
    /// Pause between streamed content fragments.
    pub chunk_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_consecutive_errors: 2,
            recent_tool_window: 3,
            chunk_delay: Duration::from_millis(50),
        }
    }
}

pub struct Orchestrator {
    pub(crate) model: Arc<dyn ModelClient>,
    pub(crate) executor: ToolExecutor,
    pub(crate) registry: Arc<ToolRegistry>,
    pub(crate) config: RunConfig,
}

pub(crate) fn build_system_prompt(session_id: Option<&str>) -> String {
    let session_line = match session_id {
        Some(id) => format!("Current session_id: {}", id),
        None => {
            "Current session_id: none yet - a sandbox will be created when a tool needs one"
                .to_string()
        }
    };
    format!(
        "You are a development assistant operating a remote sandbox through the provided \
         tools.\n{}\nAlways pass the current session_id to tools that require one. The \
         environment resets between commands, so combine related shell commands with && \
         or ;. When the user asks for an application, create the files, install \
         dependencies, and start the app before answering.",
        session_line
    )
}

fn emit(events: Option<&UnboundedSender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = events {
        // A dropped receiver must not fail the run.
        let _ = tx.send(event);
    }
}

fn aborted(
    message: String,
    session_id: Option<String>,
    tool_results: Vec<ToolResult>,
    iterations: u32,
) -> RunOutcome {
    RunOutcome {
        content: String::new(),
        session_id,
        tool_results,
        iterations,
        success: false,
        warning: None,
        error: Some(message),
    }
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn ModelClient>,
        executor: ToolExecutor,
        registry: Arc<ToolRegistry>,
        config: RunConfig,
    ) -> Self {
        Self {
            model,
            executor,
            registry,
            config,
        }
    }

    /// Drive one chat turn to a final result. Never returns an error:
    /// run-level failures come back as `success=false` outcomes with
    /// whatever partial state accumulated, including the session id so
    /// the caller can still clean up the provisioned resource.
    pub async fn run(
        &self,
        model_name: &str,
        messages: Vec<ChatMessage>,
        session_id: Option<String>,
        log_route: Option<&str>,
    ) -> RunOutcome {
        self.drive(model_name, messages, session_id, log_route, None)
            .await
    }

    pub(crate) async fn drive(
        &self,
        model_name: &str,
        messages: Vec<ChatMessage>,
        mut session: Option<String>,
        log_route: Option<&str>,
        events: Option<&UnboundedSender<AgentEvent>>,
    ) -> RunOutcome {
        let schemas = self.registry.schemas();
        let user_text = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        let mut transcript = Vec::with_capacity(messages.len() + 1);
        transcript.push(ChatMessage::system(build_system_prompt(session.as_deref())));
        transcript.extend(messages);

        let mut tool_results: Vec<ToolResult> = Vec::new();
        let mut consecutive_errors = 0u32;
        let mut iterations = 0u32;

        for iteration in 0..self.config.max_iterations {
            // Backstop against infinite tool-error loops, applied
            // before spending another model call.
            if consecutive_errors >= self.config.max_consecutive_errors {
                warn!(
                    "Aborting run after {} consecutive iterations with tool errors",
                    consecutive_errors
                );
                return aborted(
                    format!(
                        "Stopped after {} consecutive iterations with tool errors",
                        consecutive_errors
                    ),
                    session,
                    tool_results,
                    iterations,
                );
            }

            emit(events, AgentEvent::Iteration { number: iteration + 1 });

            let response = match self.model.complete(model_name, &transcript, &schemas).await {
                Ok(response) => response,
                Err(e) => {
                    return aborted(
                        format!("Model request failed: {}", e),
                        session,
                        tool_results,
                        iterations,
                    )
                }
            };
            iterations = iteration + 1;

            let Some(choice) = response.choices.into_iter().next() else {
                return aborted(
                    "No response from model".to_string(),
                    session,
                    tool_results,
                    iterations,
                );
            };
            let message = choice.message;
            let tool_calls = message.tool_calls.unwrap_or_default();

            if !tool_calls.is_empty() {
                let names: Vec<String> = tool_calls
                    .iter()
                    .map(|c| c.function.name.clone())
                    .collect();
                info!(
                    "Iteration {}: model requested {} tool call(s): {}",
                    iteration + 1,
                    tool_calls.len(),
                    names.join(", ")
                );
                emit(
                    events,
                    AgentEvent::ToolCalls {
                        count: tool_calls.len(),
                        names,
                    },
                );

                let assistant_text = message
                    .content
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| {
                        format!("I'm going to call {} tool(s) to help you.", tool_calls.len())
                    });
                transcript.push(ChatMessage::assistant(assistant_text));

                let session_was_known = session.is_some();
                let mut any_error = false;
                for call in &tool_calls {
                    emit(
                        events,
                        AgentEvent::ToolStart {
                            name: call.function.name.clone(),
                            tool_call_id: call.id.clone(),
                        },
                    );
                    let result = self.executor.execute(call, &mut session, log_route).await;
                    any_error |= result.result.is_error();

                    let content = serde_json::to_string(&result.result)
                        .unwrap_or_else(|_| r#"{"error":"unserializable tool result"}"#.to_string());
                    transcript.push(ChatMessage::tool(&call.id, content));

                    emit(
                        events,
                        AgentEvent::ToolResult {
                            name: result.function_name.clone(),
                            tool_call_id: result.tool_call_id.clone(),
                            result: result.result.clone(),
                        },
                    );
                    tool_results.push(result);
                }

                // The id became known mid-run: rewrite the system
                // prompt so later model calls see the real value.
                if !session_was_known {
                    if let Some(id) = &session {
                        emit(
                            events,
                            AgentEvent::SandboxCreated {
                                session_id: id.clone(),
                            },
                        );
                        transcript[0] =
                            ChatMessage::system(build_system_prompt(Some(id.as_str())));
                    }
                }

                consecutive_errors = if any_error { consecutive_errors + 1 } else { 0 };
                continue;
            }

            // Final-answer reply; the heuristic may still force
            // another lap when the request looks multi-step.
            let content = message.content.unwrap_or_default();
            let recent: Vec<String> = tool_results
                .iter()
                .map(|r| r.function_name.clone())
                .collect();
            if iteration + 1 < self.config.max_iterations
                && decide_continue(
                    &user_text,
                    &recent,
                    tool_results.len(),
                    self.config.recent_tool_window,
                )
            {
                info!("Continuation heuristic requested another iteration");
                emit(
                    events,
                    AgentEvent::Status {
                        message: "Continuing multi-step work".to_string(),
                    },
                );
                transcript.push(ChatMessage::system(NUDGE_MESSAGE));
                continue;
            }

            return RunOutcome {
                content,
                session_id: session,
                tool_results,
                iterations,
                success: true,
                warning: None,
                error: None,
            };
        }

        // Iteration cap: a soft termination, not an error.
        RunOutcome {
            content: "I've completed as much as I could within the iteration limit. The \
                      sandbox is ready for further use."
                .to_string(),
            session_id: session,
            tool_results,
            iterations,
            success: true,
            warning: Some("Stopped due to iteration limit".to_string()),
            error: None,
        }
    }
}
