//! In-memory sandbox control plane for tests and local dry runs.
//!
//! Records every call and lets a test script failures per operation,
//! including the "not fully provisioned yet" transient so retry
//! behavior can be exercised without a real control plane.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::client::{ExecOutput, ProcessInfo, SandboxApi};
use super::error::{Result, SandboxError};

/// The exact transient error text the executor's classifier recognizes.
pub fn provisioning_pending_message(session_id: &str) -> String {
    format!(
        "instance for sandbox {} not found, it may be not fully provisioned yet",
        session_id
    )
}

#[derive(Default)]
pub struct MockSandbox {
    /// Every (operation, session_id) pair in call order.
    pub calls: Mutex<Vec<(String, String)>>,
    files: Mutex<HashMap<String, String>>,
    processes: Mutex<Vec<ProcessInfo>>,
    /// Number of leading exec calls that fail with the provisioning
    /// transient before succeeding.
    pending_failures: AtomicUsize,
    exec_count: AtomicUsize,
    provision_count: AtomicUsize,
    fail_provision: Mutex<Option<String>>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pending_failures(failures: usize) -> Self {
        let mock = Self::default();
        mock.pending_failures.store(failures, Ordering::SeqCst);
        mock
    }

    pub fn fail_provision_with(&self, message: &str) {
        *self.fail_provision.lock().unwrap() = Some(message.to_string());
    }

    pub fn add_process(&self, id: &str, command: &str, status: &str) {
        self.processes.lock().unwrap().push(ProcessInfo {
            id: id.to_string(),
            command: command.to_string(),
            status: status.to_string(),
        });
    }

    pub fn exec_attempts(&self) -> usize {
        self.exec_count.load(Ordering::SeqCst)
    }

    pub fn provision_attempts(&self) -> usize {
        self.provision_count.load(Ordering::SeqCst)
    }

    pub fn recorded_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    fn record(&self, op: &str, session_id: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((op.to_string(), session_id.to_string()));
    }
}

#[async_trait]
impl SandboxApi for MockSandbox {
    async fn provision(&self, _image: &str, name: &str) -> Result<String> {
        self.provision_count.fetch_add(1, Ordering::SeqCst);
        self.record("provision", name);
        if let Some(message) = self.fail_provision.lock().unwrap().clone() {
            return Err(SandboxError::Api(message));
        }
        Ok("mock-session-1".to_string())
    }

    async fn deprovision(&self, session_id: &str) -> Result<()> {
        self.record("deprovision", session_id);
        Ok(())
    }

    async fn exec(
        &self,
        session_id: &str,
        command: &str,
        _timeout_secs: u64,
    ) -> Result<ExecOutput> {
        let attempt = self.exec_count.fetch_add(1, Ordering::SeqCst);
        self.record("exec", session_id);
        if attempt < self.pending_failures.load(Ordering::SeqCst) {
            return Err(SandboxError::Api(provisioning_pending_message(session_id)));
        }
        Ok(ExecOutput {
            stdout: format!("ran: {}", command),
            stderr: String::new(),
            exit_code: 0,
        })
    }

    async fn write_file(&self, session_id: &str, path: &str, content: &str) -> Result<()> {
        self.record("write_file", session_id);
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn read_file(&self, session_id: &str, path: &str) -> Result<String> {
        self.record("read_file", session_id);
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SandboxError::NotFound(path.to_string()))
    }

    async fn expose_port(&self, session_id: &str, port: u16) -> Result<String> {
        self.record("expose_port", session_id);
        Ok(format!("https://{}.mock.dev:{}", session_id, port))
    }

    async fn public_url(&self, session_id: &str) -> Result<String> {
        self.record("public_url", session_id);
        Ok(format!("https://{}.mock.dev", session_id))
    }

    async fn launch_process(&self, session_id: &str, command: &str) -> Result<String> {
        self.record("launch_process", session_id);
        let id = format!("proc-{}", self.processes.lock().unwrap().len() + 1);
        self.processes.lock().unwrap().push(ProcessInfo {
            id: id.clone(),
            command: command.to_string(),
            status: "running".to_string(),
        });
        Ok(id)
    }

    async fn list_processes(&self, session_id: &str) -> Result<Vec<ProcessInfo>> {
        self.record("list_processes", session_id);
        Ok(self.processes.lock().unwrap().clone())
    }
}
