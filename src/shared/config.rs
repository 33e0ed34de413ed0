//! Process configuration, read from the environment once at startup.
//! Everything has a workable local-dev default except the sandbox API
//! token.

use std::str::FromStr;
use std::time::Duration;

use crate::agent::executor::{ExecutorConfig, RetryPolicy};
use crate::agent::orchestrator::RunConfig;
use crate::sandbox::startup::StartupConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub inference_url: String,
    pub inference_api_key: Option<String>,
    pub inference_model: String,
    pub inference_timeout_secs: u64,

    pub sandbox_api_url: String,
    pub sandbox_api_token: String,
    pub sandbox_timeout_secs: u64,
    pub sandbox_image: String,
    pub instance_name: String,

    pub max_iterations: u32,
    pub max_consecutive_errors: u32,
    pub recent_tool_window: usize,
    pub chunk_delay_ms: u64,
    pub retry_max: u32,
    pub retry_delay_secs: u64,
    pub exec_timeout_secs: u64,

    pub app_dir: String,
    pub dev_command: String,
    pub app_port: u16,
    pub app_init_wait_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            inference_url: env_or("SANDPILOT_INFERENCE_URL", "http://localhost:8000/v1"),
            inference_api_key: std::env::var("SANDPILOT_INFERENCE_API_KEY").ok(),
            inference_model: env_or("SANDPILOT_INFERENCE_MODEL", "Qwen/Qwen2.5-7B-Instruct"),
            inference_timeout_secs: env_parse("SANDPILOT_INFERENCE_TIMEOUT_SECS", 900),

            sandbox_api_url: env_or("SANDPILOT_SANDBOX_API_URL", "http://localhost:9100"),
            sandbox_api_token: env_or("SANDPILOT_SANDBOX_API_TOKEN", ""),
            sandbox_timeout_secs: env_parse("SANDPILOT_SANDBOX_TIMEOUT_SECS", 300),
            sandbox_image: env_or("SANDPILOT_SANDBOX_IMAGE", "sandpilot/sandbox"),
            instance_name: env_or("SANDPILOT_SANDBOX_NAME", "sandpilot-sandbox"),

            max_iterations: env_parse("SANDPILOT_MAX_ITERATIONS", 5),
            max_consecutive_errors: env_parse("SANDPILOT_MAX_CONSECUTIVE_ERRORS", 2),
            recent_tool_window: env_parse("SANDPILOT_RECENT_TOOL_WINDOW", 3),
            chunk_delay_ms: env_parse("SANDPILOT_CHUNK_DELAY_MS", 50),
            retry_max: env_parse("SANDPILOT_PROVISION_RETRIES", 2),
            retry_delay_secs: env_parse("SANDPILOT_PROVISION_RETRY_DELAY_SECS", 15),
            exec_timeout_secs: env_parse("SANDPILOT_EXEC_TIMEOUT_SECS", 120),

            app_dir: env_or("SANDPILOT_APP_DIR", "/tmp/app"),
            dev_command: env_or("SANDPILOT_DEV_COMMAND", "npm run dev -- --host 0.0.0.0"),
            app_port: env_parse("SANDPILOT_APP_PORT", 80),
            app_init_wait_secs: env_parse("SANDPILOT_APP_INIT_WAIT_SECS", 3),
        }
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            max_iterations: self.max_iterations,
            max_consecutive_errors: self.max_consecutive_errors,
            recent_tool_window: self.recent_tool_window,
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            retry: RetryPolicy {
                max_retries: self.retry_max,
                delay: Duration::from_secs(self.retry_delay_secs),
            },
            sandbox_image: self.sandbox_image.clone(),
            instance_name: self.instance_name.clone(),
            exec_timeout_secs: self.exec_timeout_secs,
            startup: StartupConfig {
                app_dir: self.app_dir.clone(),
                dev_command: self.dev_command.clone(),
                app_port: self.app_port,
                init_wait: Duration::from_secs(self.app_init_wait_secs),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("SANDPILOT_TEST_PARSE", "not-a-number");
        assert_eq!(env_parse("SANDPILOT_TEST_PARSE", 7u32), 7);
        std::env::remove_var("SANDPILOT_TEST_PARSE");
    }

    #[test]
    fn config_maps_into_component_configs() {
        let config = Config::from_env();
        let run = config.run_config();
        assert_eq!(run.max_iterations, config.max_iterations);
        let exec = config.executor_config();
        assert_eq!(exec.startup.app_port, config.app_port);
    }
}
