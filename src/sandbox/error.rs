use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Sandbox API error: {0}")]
    Api(String),

    #[error("Sandbox {0} not found")]
    NotFound(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Coarse classification of a sandbox failure, used by the executor's
/// retry wrapper. Keeping the string matching here means the detection
/// rule can change without touching retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The control plane accepted the sandbox but its instance is not
    /// reachable yet. The only retryable condition.
    ProvisioningPending,
    NotFound,
    Other,
}

impl SandboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SandboxError::NotFound(_) => ErrorKind::NotFound,
            SandboxError::Api(msg) => classify_message(msg),
            _ => ErrorKind::Other,
        }
    }
}

fn classify_message(msg: &str) -> ErrorKind {
    let lower = msg.to_lowercase();
    if lower.contains("instance for sandbox")
        && lower.contains("not found")
        && lower.contains("not fully provisioned yet")
    {
        ErrorKind::ProvisioningPending
    } else {
        ErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_pending_signature_is_recognized() {
        let err = SandboxError::Api(
            "instance for sandbox svc-1 not found, it may be not fully provisioned yet"
                .to_string(),
        );
        assert_eq!(err.kind(), ErrorKind::ProvisioningPending);
    }

    #[test]
    fn partial_signature_is_not_retryable() {
        let err = SandboxError::Api("instance for sandbox svc-1 not found".to_string());
        assert_eq!(err.kind(), ErrorKind::Other);

        let err = SandboxError::Api("not fully provisioned yet".to_string());
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn not_found_maps_to_not_found_kind() {
        let err = SandboxError::NotFound("svc-1".to_string());
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
