//! Streaming variant of the orchestrator: the same state machine, but
//! every transition is also delivered as a typed event so a client can
//! render progress incrementally.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use super::orchestrator::Orchestrator;
use super::types::{ChatMessage, ToolOutcome};

/// Progress vocabulary for one run. A run emits exactly one terminal
/// event: `complete` on any successful termination (soft or not),
/// `error` otherwise.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Status {
        message: String,
    },
    SandboxCreated {
        session_id: String,
    },
    Iteration {
        number: u32,
    },
    ToolCalls {
        count: usize,
        names: Vec<String>,
    },
    ToolStart {
        name: String,
        tool_call_id: String,
    },
    ToolResult {
        name: String,
        tool_call_id: String,
        result: ToolOutcome,
    },
    Content {
        text: String,
    },
    Error {
        message: String,
    },
    Complete {
        session_id: Option<String>,
        iterations: u32,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
}

/// Whitespace-preserving fragments; concatenation reproduces the
/// original text exactly.
fn chunk_text(text: &str) -> Vec<String> {
    text.split_inclusive(char::is_whitespace)
        .map(str::to_string)
        .collect()
}

impl Orchestrator {
    /// Run one chat turn, delivering progress on `tx`. Send failures
    /// are ignored: a client that went away cannot fail the run.
    pub async fn run_streaming(
        &self,
        model_name: &str,
        messages: Vec<ChatMessage>,
        session_id: Option<String>,
        log_route: Option<&str>,
        tx: &UnboundedSender<AgentEvent>,
    ) {
        let _ = tx.send(AgentEvent::Status {
            message: "Starting run".to_string(),
        });

        // A streaming client wants the id as early as possible, so
        // provision eagerly instead of waiting for the first tool call.
        let mut session = session_id;
        if session.is_none() {
            match self.executor.ensure_session(&mut session).await {
                Ok(id) => {
                    let _ = tx.send(AgentEvent::SandboxCreated { session_id: id });
                }
                Err(e) => {
                    let _ = tx.send(AgentEvent::Error {
                        message: format!("Failed to create sandbox: {}", e),
                    });
                    return;
                }
            }
        }

        let outcome = self
            .drive(model_name, messages, session, log_route, Some(tx))
            .await;

        if outcome.success {
            for chunk in chunk_text(&outcome.content) {
                let _ = tx.send(AgentEvent::Content { text: chunk });
                if !self.config.chunk_delay.is_zero() {
                    tokio::time::sleep(self.config.chunk_delay).await;
                }
            }
            let _ = tx.send(AgentEvent::Complete {
                session_id: outcome.session_id,
                iterations: outcome.iterations,
                success: true,
                warning: outcome.warning,
            });
        } else {
            let _ = tx.send(AgentEvent::Error {
                message: outcome
                    .error
                    .unwrap_or_else(|| "Run failed".to_string()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::executor::{ExecutorConfig, RetryPolicy, ToolExecutor};
    use crate::agent::mock::{text_reply, tool_reply, ScriptedModel};
    use crate::agent::orchestrator::RunConfig;
    use crate::agent::registry::ToolRegistry;
    use crate::logs::LogHub;
    use crate::sandbox::mock::MockSandbox;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn orchestrator(model: Arc<ScriptedModel>, sandbox: Arc<MockSandbox>) -> Orchestrator {
        let registry = Arc::new(ToolRegistry::builtin());
        let executor = ToolExecutor::new(
            sandbox,
            Arc::new(LogHub::new()),
            registry.clone(),
            ExecutorConfig {
                retry: RetryPolicy {
                    max_retries: 2,
                    delay: Duration::from_millis(1),
                },
                ..ExecutorConfig::default()
            },
        );
        Orchestrator::new(
            model,
            executor,
            registry,
            RunConfig {
                chunk_delay: Duration::ZERO,
                ..RunConfig::default()
            },
        )
    }

    async fn collect(
        orch: &Orchestrator,
        messages: Vec<ChatMessage>,
        session: Option<String>,
    ) -> Vec<AgentEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        orch.run_streaming("test-model", messages, session, None, &tx)
            .await;
        drop(tx);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn position(events: &[AgentEvent], pred: impl Fn(&AgentEvent) -> bool) -> usize {
        events.iter().position(pred).expect("event not found")
    }

    #[tokio::test]
    async fn events_arrive_in_iteration_order() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_reply(&[("c1", "run_command", r#"{"command": "ls"}"#)]),
            text_reply("done and done"),
        ]));
        let orch = orchestrator(model, Arc::new(MockSandbox::new()));

        let events = collect(&orch, vec![ChatMessage::user("list files")], None).await;

        assert!(matches!(events[0], AgentEvent::Status { .. }));
        assert!(matches!(events[1], AgentEvent::SandboxCreated { .. }));

        let iteration = position(&events, |e| matches!(e, AgentEvent::Iteration { number: 1 }));
        let calls = position(&events, |e| matches!(e, AgentEvent::ToolCalls { .. }));
        let start = position(&events, |e| matches!(e, AgentEvent::ToolStart { .. }));
        let result = position(&events, |e| matches!(e, AgentEvent::ToolResult { .. }));
        assert!(iteration < calls && calls < start && start < result);

        // Exactly one terminal event, and it is the last one.
        let terminals = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::Complete { .. } | AgentEvent::Error { .. }))
            .count();
        assert_eq!(terminals, 1);
        assert!(matches!(events.last().unwrap(), AgentEvent::Complete { success: true, .. }));
    }

    #[tokio::test]
    async fn content_chunks_reassemble_the_final_text() {
        let model = Arc::new(ScriptedModel::new(vec![text_reply(
            "line one\nline two  spaced",
        )]));
        let orch = orchestrator(model, Arc::new(MockSandbox::new()));

        let events = collect(
            &orch,
            vec![ChatMessage::user("say something")],
            Some("svc-1".to_string()),
        )
        .await;

        let reassembled: String = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Content { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(reassembled, "line one\nline two  spaced");
    }

    #[tokio::test]
    async fn supplied_session_skips_eager_provisioning() {
        let model = Arc::new(ScriptedModel::new(vec![text_reply("hi")]));
        let sandbox = Arc::new(MockSandbox::new());
        let orch = orchestrator(model, sandbox.clone());

        let events = collect(
            &orch,
            vec![ChatMessage::user("say hi")],
            Some("svc-7".to_string()),
        )
        .await;

        assert_eq!(sandbox.provision_attempts(), 0);
        assert!(!events
            .iter()
            .any(|e| matches!(e, AgentEvent::SandboxCreated { .. })));
    }

    #[tokio::test]
    async fn failures_end_with_a_single_error_event() {
        // No scripted replies: the first model call fails.
        let model = Arc::new(ScriptedModel::new(vec![]));
        let orch = orchestrator(model, Arc::new(MockSandbox::new()));

        let events = collect(&orch, vec![ChatMessage::user("hi")], None).await;

        assert!(matches!(events.last().unwrap(), AgentEvent::Error { .. }));
        let terminals = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::Complete { .. } | AgentEvent::Error { .. }))
            .count();
        assert_eq!(terminals, 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, AgentEvent::Content { .. })));
    }

    #[tokio::test]
    async fn provisioning_failure_is_terminal() {
        let model = Arc::new(ScriptedModel::new(vec![text_reply("never reached")]));
        let sandbox = Arc::new(MockSandbox::new());
        sandbox.fail_provision_with("quota exceeded");
        let orch = orchestrator(model.clone(), sandbox);

        let events = collect(&orch, vec![ChatMessage::user("hi")], None).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], AgentEvent::Error { message } if message.contains("quota")));
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn events_serialize_with_snake_case_tags() {
        let event = AgentEvent::SandboxCreated {
            session_id: "svc-1".to_string(),
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "sandbox_created");
        assert_eq!(wire["session_id"], "svc-1");

        let done = AgentEvent::Complete {
            session_id: None,
            iterations: 2,
            success: true,
            warning: None,
        };
        let wire = serde_json::to_value(&done).unwrap();
        assert_eq!(wire["type"], "complete");
        assert!(wire.get("warning").is_none());
    }
}
