use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::error::{Result, SandboxError};

/// Output of one command execution inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// A background process running inside a sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub id: String,
    pub command: String,
    pub status: String,
}

/// Remote sandbox control plane. The orchestration core only depends
/// on this trait; the HTTP client below is one implementation, the
/// in-memory mock is another.
#[async_trait]
pub trait SandboxApi: Send + Sync {
    /// Create a sandbox and return its session identifier.
    async fn provision(&self, image: &str, name: &str) -> Result<String>;

    /// Delete a sandbox.
    async fn deprovision(&self, session_id: &str) -> Result<()>;

    /// Run a shell command to completion.
    async fn exec(&self, session_id: &str, command: &str, timeout_secs: u64)
        -> Result<ExecOutput>;

    /// Create or overwrite a file.
    async fn write_file(&self, session_id: &str, path: &str, content: &str) -> Result<()>;

    /// Read a file's contents.
    async fn read_file(&self, session_id: &str, path: &str) -> Result<String>;

    /// Expose a port to the internet, returning the public URL.
    async fn expose_port(&self, session_id: &str, port: u16) -> Result<String>;

    /// Public URL of the sandbox, if any port has been exposed.
    async fn public_url(&self, session_id: &str) -> Result<String>;

    /// Launch a long-running background process, returning its id.
    async fn launch_process(&self, session_id: &str, command: &str) -> Result<String>;

    /// List background processes.
    async fn list_processes(&self, session_id: &str) -> Result<Vec<ProcessInfo>>;
}

pub struct SandboxClient {
    client: Client,
    base_url: String,
    api_token: String,
}

#[derive(Serialize)]
struct ProvisionRequest<'a> {
    image: &'a str,
    name: &'a str,
}

#[derive(Deserialize)]
struct ProvisionResponse {
    id: String,
}

#[derive(Serialize)]
struct ExecRequest<'a> {
    command: &'a str,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct WriteFileRequest<'a> {
    path: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct FileResponse {
    content: String,
}

#[derive(Serialize)]
struct ExposePortRequest {
    port: u16,
}

#[derive(Deserialize)]
struct UrlResponse {
    url: String,
}

#[derive(Serialize)]
struct LaunchProcessRequest<'a> {
    command: &'a str,
}

#[derive(Deserialize)]
struct LaunchProcessResponse {
    id: String,
}

impl SandboxClient {
    pub fn new(base_url: &str, api_token: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    async fn check<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
        session_id: &str,
    ) -> Result<T> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(response.json::<T>().await?),
            StatusCode::UNAUTHORIZED => {
                Err(SandboxError::Api("Unauthorized - check API token".to_string()))
            }
            StatusCode::NOT_FOUND => Err(SandboxError::NotFound(session_id.to_string())),
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(SandboxError::Api(format!("({}) {}", status, error_text)))
            }
        }
    }

    async fn check_empty(&self, response: reqwest::Response, session_id: &str) -> Result<()> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::UNAUTHORIZED => {
                Err(SandboxError::Api("Unauthorized - check API token".to_string()))
            }
            StatusCode::NOT_FOUND => Err(SandboxError::NotFound(session_id.to_string())),
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(SandboxError::Api(format!("({}) {}", status, error_text)))
            }
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", format!("Bearer {}", self.api_token))
    }
}

#[async_trait]
impl SandboxApi for SandboxClient {
    async fn provision(&self, image: &str, name: &str) -> Result<String> {
        debug!("Provisioning sandbox: image={} name={}", image, name);
        let response = self
            .authorized(self.client.post(self.url("/sandboxes")))
            .json(&ProvisionRequest { image, name })
            .send()
            .await?;
        let created: ProvisionResponse = self.check(response, name).await?;
        Ok(created.id)
    }

    async fn deprovision(&self, session_id: &str) -> Result<()> {
        let response = self
            .authorized(
                self.client
                    .delete(self.url(&format!("/sandboxes/{}", session_id))),
            )
            .send()
            .await?;
        self.check_empty(response, session_id).await
    }

    async fn exec(
        &self,
        session_id: &str,
        command: &str,
        timeout_secs: u64,
    ) -> Result<ExecOutput> {
        debug!("Running command in sandbox {}: {}", session_id, command);
        let response = self
            .authorized(
                self.client
                    .post(self.url(&format!("/sandboxes/{}/exec", session_id))),
            )
            .json(&ExecRequest {
                command,
                timeout_secs,
            })
            .send()
            .await?;
        self.check(response, session_id).await
    }

    async fn write_file(&self, session_id: &str, path: &str, content: &str) -> Result<()> {
        let response = self
            .authorized(
                self.client
                    .put(self.url(&format!("/sandboxes/{}/files", session_id))),
            )
            .json(&WriteFileRequest { path, content })
            .send()
            .await?;
        self.check_empty(response, session_id).await
    }

    async fn read_file(&self, session_id: &str, path: &str) -> Result<String> {
        let response = self
            .authorized(
                self.client
                    .get(self.url(&format!("/sandboxes/{}/files", session_id))),
            )
            .query(&[("path", path)])
            .send()
            .await?;
        let file: FileResponse = self.check(response, session_id).await?;
        Ok(file.content)
    }

    async fn expose_port(&self, session_id: &str, port: u16) -> Result<String> {
        let response = self
            .authorized(
                self.client
                    .post(self.url(&format!("/sandboxes/{}/ports", session_id))),
            )
            .json(&ExposePortRequest { port })
            .send()
            .await?;
        let exposed: UrlResponse = self.check(response, session_id).await?;
        Ok(exposed.url)
    }

    async fn public_url(&self, session_id: &str) -> Result<String> {
        let response = self
            .authorized(
                self.client
                    .get(self.url(&format!("/sandboxes/{}/url", session_id))),
            )
            .send()
            .await?;
        let url: UrlResponse = self.check(response, session_id).await?;
        Ok(url.url)
    }

    async fn launch_process(&self, session_id: &str, command: &str) -> Result<String> {
        debug!(
            "Launching background process in sandbox {}: {}",
            session_id, command
        );
        let response = self
            .authorized(
                self.client
                    .post(self.url(&format!("/sandboxes/{}/processes", session_id))),
            )
            .json(&LaunchProcessRequest { command })
            .send()
            .await?;
        let launched: LaunchProcessResponse = self.check(response, session_id).await?;
        Ok(launched.id)
    }

    async fn list_processes(&self, session_id: &str) -> Result<Vec<ProcessInfo>> {
        let response = self
            .authorized(
                self.client
                    .get(self.url(&format!("/sandboxes/{}/processes", session_id))),
            )
            .send()
            .await?;
        self.check(response, session_id).await
    }
}
