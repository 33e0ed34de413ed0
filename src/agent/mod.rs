// Tool-calling orchestration: registry, executor, bounded loop, and
// the streaming adapter.
pub mod error;
pub mod executor;
pub mod heuristics;
pub mod inference;
pub mod mock;
pub mod orchestrator;
pub mod registry;
pub mod stream;
pub mod types;

pub use error::AgentError;
pub use executor::{ExecutorConfig, RetryPolicy, ToolExecutor};
pub use inference::{InferenceClient, ModelClient};
pub use orchestrator::{Orchestrator, RunConfig};
pub use registry::{ToolRegistry, ToolSpec};
pub use stream::AgentEvent;
pub use types::{ChatMessage, RunOutcome, ToolCall, ToolOutcome, ToolResult};
