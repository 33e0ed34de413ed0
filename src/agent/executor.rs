//! Turns one model-issued tool call into one `ToolResult`. Never
//! raises past its own boundary: every failure mode becomes a
//! structured `{error}` outcome the model can read and self-correct
//! from on its next turn.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::registry::ToolRegistry;
use super::types::{ToolCall, ToolOutcome, ToolResult};
use crate::logs::LogHub;
use crate::sandbox::{startup, startup::StartupConfig, ErrorKind, SandboxApi, SandboxError};

/// Bounded retry for the one recognized transient failure class.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub retry: RetryPolicy,
    pub sandbox_image: String,
    pub instance_name: String,
    pub exec_timeout_secs: u64,
    pub startup: StartupConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            sandbox_image: "sandpilot/sandbox".to_string(),
            instance_name: "sandpilot-sandbox".to_string(),
            exec_timeout_secs: 120,
            startup: StartupConfig::default(),
        }
    }
}

enum DispatchError {
    Sandbox(SandboxError),
    BadArgument(String),
}

impl From<SandboxError> for DispatchError {
    fn from(e: SandboxError) -> Self {
        DispatchError::Sandbox(e)
    }
}

impl DispatchError {
    fn is_provisioning_pending(&self) -> bool {
        matches!(self, DispatchError::Sandbox(e) if e.kind() == ErrorKind::ProvisioningPending)
    }

    fn message(&self) -> String {
        match self {
            DispatchError::Sandbox(e) => e.to_string(),
            DispatchError::BadArgument(msg) => msg.clone(),
        }
    }
}

pub struct ToolExecutor {
    sandbox: Arc<dyn SandboxApi>,
    logs: Arc<LogHub>,
    registry: Arc<ToolRegistry>,
    config: ExecutorConfig,
}

impl ToolExecutor {
    pub fn new(
        sandbox: Arc<dyn SandboxApi>,
        logs: Arc<LogHub>,
        registry: Arc<ToolRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            sandbox,
            logs,
            registry,
            config,
        }
    }

    /// Instance names must be unique per provision request; the
    /// control plane rejects duplicates.
    fn unique_instance_name(&self) -> String {
        format!("{}-{}", self.config.instance_name, Uuid::new_v4().simple())
    }

    /// Provision a sandbox if the run does not have one yet, adopting
    /// the returned id as authoritative.
    pub async fn ensure_session(
        &self,
        session: &mut Option<String>,
    ) -> crate::sandbox::error::Result<String> {
        if let Some(id) = session {
            return Ok(id.clone());
        }
        let id = self
            .sandbox
            .provision(&self.config.sandbox_image, &self.unique_instance_name())
            .await?;
        info!("Provisioned sandbox {} on demand", id);
        *session = Some(id.clone());
        Ok(id)
    }

    /// Execute one tool call. `session` is the run's authoritative
    /// session identifier; any value the model supplied for it in the
    /// arguments is discarded.
    pub async fn execute(
        &self,
        call: &ToolCall,
        session: &mut Option<String>,
        log_route: Option<&str>,
    ) -> ToolResult {
        let outcome = self.run_call(call, session, log_route).await;
        ToolResult {
            tool_call_id: call.id.clone(),
            function_name: call.function.name.clone(),
            result: outcome,
        }
    }

    async fn run_call(
        &self,
        call: &ToolCall,
        session: &mut Option<String>,
        log_route: Option<&str>,
    ) -> ToolOutcome {
        let name = call.function.name.as_str();

        if !self.registry.contains(name) {
            return ToolOutcome::err(self.registry.unknown_tool_error(name));
        }

        let raw = call.function.arguments.as_str();
        let mut args: Map<String, Value> = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => return ToolOutcome::err(format!("Invalid JSON arguments: {}", raw)),
        };

        if name == "create_environment" {
            return self.create_environment(&args, session, log_route).await;
        }

        let session_id = match self.ensure_session(session).await {
            Ok(id) => id,
            Err(e) => return ToolOutcome::err(format!("Failed to create sandbox: {}", e)),
        };
        // The model may hallucinate or recall stale identifiers; the
        // run's tracked value is ground truth.
        args.insert("session_id".to_string(), Value::String(session_id.clone()));

        let route = log_route.unwrap_or(&session_id).to_string();
        self.logs.publish(
            &route,
            "tool_start",
            format!("Executing {}", name),
            Some(json!({"tool": name, "arguments": Value::Object(args.clone())})),
        );

        match self.with_retry(name, &args, &session_id, &route).await {
            Ok(value) => {
                self.logs.publish(
                    &route,
                    "tool_result",
                    format!("{} completed", name),
                    Some(json!({"tool": name, "result": value})),
                );
                ToolOutcome::ok(value)
            }
            Err(message) => {
                self.logs.publish(
                    &route,
                    "tool_error",
                    format!("{} failed: {}", name, message),
                    Some(json!({"tool": name})),
                );
                ToolOutcome::err(message)
            }
        }
    }

    async fn create_environment(
        &self,
        args: &Map<String, Value>,
        session: &mut Option<String>,
        log_route: Option<&str>,
    ) -> ToolOutcome {
        let image = args
            .get("image")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.sandbox_image);
        let instance_name = args
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.unique_instance_name());

        match self.sandbox.provision(image, &instance_name).await {
            Ok(id) => {
                info!("Created sandbox {} ({})", id, image);
                *session = Some(id.clone());
                let route = log_route.unwrap_or(&id);
                self.logs.publish(
                    route,
                    "sandbox_created",
                    format!("Sandbox {} created", id),
                    Some(json!({"session_id": id})),
                );
                ToolOutcome::ok(json!({
                    "session_id": id,
                    "message": "Sandbox created and ready"
                }))
            }
            Err(e) => ToolOutcome::err(format!("Failed to create sandbox: {}", e)),
        }
    }

    async fn with_retry(
        &self,
        name: &str,
        args: &Map<String, Value>,
        session_id: &str,
        route: &str,
    ) -> std::result::Result<Value, String> {
        let mut attempt = 0u32;
        loop {
            match self.dispatch(name, args, session_id, route).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_provisioning_pending() => {
                    if attempt < self.config.retry.max_retries {
                        attempt += 1;
                        warn!(
                            "Sandbox {} not ready, retry {}/{} in {:?}",
                            session_id, attempt, self.config.retry.max_retries, self.config.retry.delay
                        );
                        tokio::time::sleep(self.config.retry.delay).await;
                        continue;
                    }
                    return Err(format!(
                        "Sandbox {} is still provisioning after {} retries: {}",
                        session_id,
                        self.config.retry.max_retries,
                        e.message()
                    ));
                }
                Err(e) => return Err(e.message()),
            }
        }
    }

    async fn dispatch(
        &self,
        name: &str,
        args: &Map<String, Value>,
        session_id: &str,
        route: &str,
    ) -> std::result::Result<Value, DispatchError> {
        match name {
            "run_command" => {
                let command = require_str(args, "command")?;
                let timeout = args
                    .get("timeout_secs")
                    .and_then(Value::as_u64)
                    .unwrap_or(self.config.exec_timeout_secs);
                let output = self.sandbox.exec(session_id, command, timeout).await?;
                Ok(json!({
                    "stdout": output.stdout,
                    "stderr": output.stderr,
                    "exit_code": output.exit_code,
                }))
            }
            "read_file" => {
                let path = require_str(args, "path")?;
                let content = self.sandbox.read_file(session_id, path).await?;
                Ok(json!({"path": path, "content": content}))
            }
            "write_file" => {
                let path = require_str(args, "path")?;
                let content = require_str(args, "content")?;
                self.sandbox.write_file(session_id, path, content).await?;
                Ok(Value::String(format!("File written to {}", path)))
            }
            "get_url" => {
                let url = self.sandbox.public_url(session_id).await?;
                Ok(Value::String(url))
            }
            "expose_port" => {
                let port = args
                    .get("port")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| missing("port"))?;
                let port = u16::try_from(port)
                    .map_err(|_| DispatchError::BadArgument(format!("Invalid port: {}", port)))?;
                let url = self.sandbox.expose_port(session_id, port).await?;
                Ok(Value::String(url))
            }
            "start_app" => {
                let summary = startup::start_app(
                    self.sandbox.as_ref(),
                    &self.logs,
                    session_id,
                    route,
                    &self.config.startup,
                )
                .await?;
                Ok(Value::String(summary))
            }
            // Unreachable after registry validation; kept as a guard
            // for tools registered without a dispatch arm.
            other => Err(DispatchError::BadArgument(format!(
                "Tool {} has no bound implementation",
                other
            ))),
        }
    }
}

fn missing(field: &str) -> DispatchError {
    DispatchError::BadArgument(format!("Missing required argument: {}", field))
}

fn require_str<'a>(
    args: &'a Map<String, Value>,
    field: &str,
) -> std::result::Result<&'a str, DispatchError> {
    args.get(field).and_then(Value::as_str).ok_or_else(|| missing(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::mock::MockSandbox;

    fn executor(sandbox: Arc<MockSandbox>) -> ToolExecutor {
        let config = ExecutorConfig {
            retry: RetryPolicy {
                max_retries: 2,
                delay: Duration::from_millis(1),
            },
            startup: StartupConfig {
                init_wait: Duration::from_millis(1),
                ..StartupConfig::default()
            },
            ..ExecutorConfig::default()
        };
        ToolExecutor::new(
            sandbox,
            Arc::new(LogHub::new()),
            Arc::new(ToolRegistry::builtin()),
            config,
        )
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected_before_any_side_effect() {
        let sandbox = Arc::new(MockSandbox::new());
        let exec = executor(sandbox.clone());
        let mut session = Some("abc-123".to_string());

        let call = ToolCall::new("c1", "delete_everything", "{}");
        let result = exec.execute(&call, &mut session, None).await;

        match result.result {
            ToolOutcome::Failure { error } => {
                assert!(error.starts_with("Unknown function: delete_everything."));
                assert!(error.contains("run_command"));
            }
            ToolOutcome::Success { .. } => panic!("expected an error"),
        }
        assert!(sandbox.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_arguments_are_rejected_before_dispatch() {
        let sandbox = Arc::new(MockSandbox::new());
        let exec = executor(sandbox.clone());
        let mut session = Some("abc-123".to_string());

        let call = ToolCall::new("c1", "run_command", "not json at all");
        let result = exec.execute(&call, &mut session, None).await;

        match result.result {
            ToolOutcome::Failure { error } => {
                assert_eq!(error, "Invalid JSON arguments: not json at all");
            }
            ToolOutcome::Success { .. } => panic!("expected an error"),
        }
        assert!(sandbox.recorded_calls().is_empty());
    }

    #[tokio::test]
    async fn authoritative_session_overrides_model_supplied_value() {
        let sandbox = Arc::new(MockSandbox::new());
        let exec = executor(sandbox.clone());
        let mut session = Some("abc-123".to_string());

        let call = ToolCall::new(
            "c1",
            "run_command",
            r#"{"session_id": "my-guess", "command": "ls"}"#,
        );
        let result = exec.execute(&call, &mut session, None).await;

        assert!(!result.result.is_error());
        let calls = sandbox.recorded_calls();
        assert_eq!(calls, vec![("exec".to_string(), "abc-123".to_string())]);
    }

    #[tokio::test]
    async fn missing_session_triggers_auto_provisioning() {
        let sandbox = Arc::new(MockSandbox::new());
        let exec = executor(sandbox.clone());
        let mut session = None;

        let call = ToolCall::new("c1", "run_command", r#"{"command": "echo hi"}"#);
        let result = exec.execute(&call, &mut session, None).await;

        assert!(!result.result.is_error());
        assert_eq!(session.as_deref(), Some("mock-session-1"));
        assert_eq!(sandbox.provision_attempts(), 1);
        let calls = sandbox.recorded_calls();
        assert_eq!(calls.last().unwrap().1, "mock-session-1");
    }

    #[tokio::test]
    async fn create_environment_adopts_the_new_session() {
        let sandbox = Arc::new(MockSandbox::new());
        let exec = executor(sandbox.clone());
        let mut session = None;

        let call = ToolCall::new("c1", "create_environment", "{}");
        let result = exec.execute(&call, &mut session, None).await;

        assert_eq!(session.as_deref(), Some("mock-session-1"));
        match result.result {
            ToolOutcome::Success { result } => {
                assert_eq!(result["session_id"], "mock-session-1");
            }
            ToolOutcome::Failure { error } => panic!("unexpected error: {}", error),
        }
    }

    #[tokio::test]
    async fn provisioning_pending_is_retried_to_success() {
        // First two attempts fail with the transient signature.
        let sandbox = Arc::new(MockSandbox::with_pending_failures(2));
        let exec = executor(sandbox.clone());
        let mut session = Some("svc-1".to_string());

        let call = ToolCall::new("c1", "run_command", r#"{"command": "ls"}"#);
        let result = exec.execute(&call, &mut session, None).await;

        assert!(!result.result.is_error());
        assert_eq!(sandbox.exec_attempts(), 3);
    }

    #[tokio::test]
    async fn retry_exhaustion_is_labelled_explicitly() {
        let sandbox = Arc::new(MockSandbox::with_pending_failures(10));
        let exec = executor(sandbox.clone());
        let mut session = Some("svc-1".to_string());

        let call = ToolCall::new("c1", "run_command", r#"{"command": "ls"}"#);
        let result = exec.execute(&call, &mut session, None).await;

        match result.result {
            ToolOutcome::Failure { error } => {
                assert!(error.contains("still provisioning after 2 retries"));
            }
            ToolOutcome::Success { .. } => panic!("expected exhaustion"),
        }
        // Initial attempt plus two retries, never more.
        assert_eq!(sandbox.exec_attempts(), 3);
    }

    #[tokio::test]
    async fn missing_required_argument_is_a_tool_level_error() {
        let sandbox = Arc::new(MockSandbox::new());
        let exec = executor(sandbox.clone());
        let mut session = Some("svc-1".to_string());

        let call = ToolCall::new("c1", "write_file", r#"{"path": "/tmp/a.txt"}"#);
        let result = exec.execute(&call, &mut session, None).await;

        match result.result {
            ToolOutcome::Failure { error } => {
                assert_eq!(error, "Missing required argument: content");
            }
            ToolOutcome::Success { .. } => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn tool_progress_is_published_to_the_log_route() {
        let sandbox = Arc::new(MockSandbox::new());
        let exec = executor(sandbox.clone());
        let mut session = Some("svc-1".to_string());
        let mut rx = exec.logs.subscribe("route-1");

        let call = ToolCall::new("c1", "run_command", r#"{"command": "ls"}"#);
        exec.execute(&call, &mut session, Some("route-1")).await;

        assert_eq!(rx.recv().await.unwrap().kind, "tool_start");
        assert_eq!(rx.recv().await.unwrap().kind, "tool_result");
    }
}
