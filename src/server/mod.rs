pub mod error;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

use crate::agent::Orchestrator;
use crate::logs::LogHub;
use crate::sandbox::SandboxApi;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub sandbox: Arc<dyn SandboxApi>,
    pub logs: Arc<LogHub>,
    pub default_model: String,
}
