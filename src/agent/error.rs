use thiserror::Error;

use crate::sandbox::SandboxError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
