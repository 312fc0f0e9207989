mod cli;
mod config;
mod server;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::{error, info};

use balancer_core::registry::ManagerRegistry;

fn now_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cli.log_level.clone()))
        .init();

    let mut agent_config = config::load_config(cli.config.as_deref())?;
    if let Some(bind) = cli.bind_address {
        agent_config.bind_address = bind;
    }

    let registry = Arc::new(ManagerRegistry::new());
    let mut refresh_tasks = Vec::new();

    for (name, patch) in agent_config.managers {
        info!(manager = %name, "creating manager from startup config");
        let manager = registry.create(&name, patch)?;
        refresh_tasks.push(tokio::spawn(balancer_core::refresh::run_refresh_loop(
            manager,
            now_seconds,
        )));
    }

    let app = server::router(registry);
    let listener = tokio::net::TcpListener::bind(&agent_config.bind_address).await?;
    info!(bind_address = %agent_config.bind_address, "balancer-agent listening");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install ctrl_c handler");
        }
        info!("shutdown signal received, draining in-flight requests");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    for task in refresh_tasks {
        task.abort();
    }

    info!("balancer-agent stopped");
    Ok(())
}
