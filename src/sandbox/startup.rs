//! Dev-server startup composition for the `start_app` tool.
//!
//! Order matters: the port is exposed before the server starts so the
//! public URL is routable the moment the process binds, and an already
//! running server short-circuits the whole sequence instead of
//! spawning a duplicate on a busy port.

use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use super::client::{ProcessInfo, SandboxApi};
use super::error::Result;
use crate::logs::LogHub;

/// How the dev server is launched. Carried in configuration; the
/// defaults suit a Node project living in the sandbox app directory.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub app_dir: String,
    pub dev_command: String,
    pub app_port: u16,
    /// Wait after launching before checking the process came up.
    pub init_wait: Duration,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            app_dir: "/tmp/app".to_string(),
            dev_command: "npm run dev -- --host 0.0.0.0".to_string(),
            app_port: 80,
            init_wait: Duration::from_secs(3),
        }
    }
}

fn is_dev_server(process: &ProcessInfo) -> bool {
    let cmd = process.command.to_lowercase();
    process.status == "running" && (cmd.contains("npm run dev") || cmd.contains("vite"))
}

/// Start the application in the sandbox and expose it publicly.
/// Returns a human-readable summary for the model's transcript.
pub async fn start_app(
    api: &dyn SandboxApi,
    logs: &LogHub,
    session_id: &str,
    log_route: &str,
    cfg: &StartupConfig,
) -> Result<String> {
    logs.publish(
        log_route,
        "app_start",
        "Starting application...",
        Some(json!({"session_id": session_id, "port": cfg.app_port})),
    );

    // An existing dev server means the app is already reachable.
    let processes = api.list_processes(session_id).await.unwrap_or_default();
    if let Some(existing) = processes.iter().find(|p| is_dev_server(p)) {
        let url = api.public_url(session_id).await?;
        info!(
            "Dev server already running in sandbox {} (process {})",
            session_id, existing.id
        );
        logs.publish(
            log_route,
            "app_complete",
            format!("Application already accessible at {}", url),
            Some(json!({"url": url, "process_id": existing.id})),
        );
        return Ok(format!(
            "App is already running.\nProcess ID: {}\nPublic URL: {}",
            existing.id, url
        ));
    }

    logs.publish(
        log_route,
        "expose_start",
        format!("Exposing port {} for external access...", cfg.app_port),
        Some(json!({"port": cfg.app_port})),
    );
    let exposed_url = api.expose_port(session_id, cfg.app_port).await?;
    logs.publish(
        log_route,
        "expose_complete",
        format!("Port {} exposed", cfg.app_port),
        Some(json!({"url": exposed_url})),
    );

    let command = format!(
        "cd {} && {} --port {}",
        cfg.app_dir, cfg.dev_command, cfg.app_port
    );
    logs.publish(
        log_route,
        "server_start",
        format!("Starting development server on port {}...", cfg.app_port),
        Some(json!({"command": command})),
    );
    let process_id = api.launch_process(session_id, &command).await?;

    logs.publish(
        log_route,
        "server_starting",
        "Waiting for server to initialize...",
        None,
    );
    tokio::time::sleep(cfg.init_wait).await;

    let status = match api.list_processes(session_id).await {
        Ok(processes) => processes
            .iter()
            .find(|p| p.id == process_id)
            .map(|p| p.status.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        Err(e) => {
            warn!("Could not verify dev server process: {}", e);
            "unknown".to_string()
        }
    };

    if status == "running" {
        logs.publish(
            log_route,
            "server_ready",
            "Development server is running",
            Some(json!({"process_id": process_id})),
        );
    } else {
        logs.publish(
            log_route,
            "server_warning",
            "Server may still be starting...",
            Some(json!({"status": status})),
        );
    }

    let url = api.public_url(session_id).await?;
    logs.publish(
        log_route,
        "app_complete",
        format!("Application started and accessible at {}", url),
        Some(json!({"url": url, "process_id": process_id})),
    );

    Ok(format!(
        "App started.\nPort {}: {}\nDev server: {}\nProcess ID: {}\nPublic URL: {}",
        cfg.app_port, exposed_url, status, process_id, url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::mock::MockSandbox;

    fn quick_config() -> StartupConfig {
        StartupConfig {
            init_wait: Duration::from_millis(1),
            ..StartupConfig::default()
        }
    }

    #[tokio::test]
    async fn starts_server_and_reports_url() {
        let api = MockSandbox::new();
        let logs = LogHub::new();

        let summary = start_app(&api, &logs, "svc-1", "svc-1", &quick_config())
            .await
            .unwrap();

        assert!(summary.contains("Public URL: https://svc-1.mock.dev"));
        let ops: Vec<String> = api
            .recorded_calls()
            .into_iter()
            .map(|(op, _)| op)
            .collect();
        // Port exposure must precede the launch.
        let expose_at = ops.iter().position(|o| o == "expose_port").unwrap();
        let launch_at = ops.iter().position(|o| o == "launch_process").unwrap();
        assert!(expose_at < launch_at);
    }

    #[tokio::test]
    async fn short_circuits_when_dev_server_already_running() {
        let api = MockSandbox::new();
        api.add_process("proc-9", "npm run dev -- --host 0.0.0.0", "running");
        let logs = LogHub::new();

        let summary = start_app(&api, &logs, "svc-1", "svc-1", &quick_config())
            .await
            .unwrap();

        assert!(summary.contains("already running"));
        let ops: Vec<String> = api
            .recorded_calls()
            .into_iter()
            .map(|(op, _)| op)
            .collect();
        assert!(!ops.contains(&"expose_port".to_string()));
        assert!(!ops.contains(&"launch_process".to_string()));
    }

    #[tokio::test]
    async fn progress_is_broadcast_to_log_subscribers() {
        let api = MockSandbox::new();
        let logs = LogHub::new();
        let mut rx = logs.subscribe("route-7");

        start_app(&api, &logs, "svc-1", "route-7", &quick_config())
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, "app_start");
        let mut kinds = vec![first.kind];
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        assert_eq!(kinds.last().unwrap(), "app_complete");
    }
}
