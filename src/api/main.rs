use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[path = "../agent/mod.rs"]
mod agent;
#[path = "../logs/mod.rs"]
mod logs;
#[path = "../sandbox/mod.rs"]
mod sandbox;
#[path = "../server/mod.rs"]
mod server;
#[path = "../shared/mod.rs"]
mod shared;

use agent::{InferenceClient, Orchestrator, ToolExecutor, ToolRegistry};
use logs::LogHub;
use sandbox::{SandboxApi, SandboxClient};
use server::{routes::create_router, AppState};
use shared::Config;

#[derive(Parser, Debug)]
#[command(
    name = "sandpilot-api",
    about = "Chat-driven sandbox orchestration service",
    version
)]
struct Args {
    #[arg(long, env = "SANDPILOT_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "SANDPILOT_PORT", default_value_t = 9000)]
    port: u16,

    #[arg(long, env = "SANDPILOT_LOG_DIR", default_value = "/var/log/sandpilot")]
    log_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _ = shared::logging::init_service_logging(&args.log_dir, "sandpilot_api");

    let config = Config::from_env();

    let model = InferenceClient::new(
        &config.inference_url,
        config.inference_api_key.as_deref(),
        config.inference_timeout_secs,
    )?;
    let sandbox: Arc<dyn SandboxApi> = Arc::new(SandboxClient::new(
        &config.sandbox_api_url,
        &config.sandbox_api_token,
        config.sandbox_timeout_secs,
    )?);
    let logs = Arc::new(LogHub::new());
    let registry = Arc::new(ToolRegistry::builtin());

    let executor = ToolExecutor::new(
        sandbox.clone(),
        logs.clone(),
        registry.clone(),
        config.executor_config(),
    );
    let orchestrator = Orchestrator::new(Arc::new(model), executor, registry, config.run_config());

    let state = Arc::new(AppState {
        orchestrator,
        sandbox,
        logs,
        default_model: config.inference_model.clone(),
    });
    let app = create_router(state);

    let bind_addr = format!("{}:{}", args.host, args.port);
    info!("Sandpilot API listening on {}", bind_addr);
    info!("Chat endpoint: http://{}/v0/chat", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
