// Remote sandbox control plane: client, error taxonomy, and the
// composite dev-server startup flow.
pub mod client;
pub mod error;
pub mod mock;
pub mod startup;

pub use client::{ExecOutput, ProcessInfo, SandboxApi, SandboxClient};
pub use error::{ErrorKind, SandboxError};
