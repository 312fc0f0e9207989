//! Command-line flags. Every flag doubles as an environment variable via
//! `clap`'s `env` feature, one of three override layers alongside the TOML
//! file and the built-in defaults in [`crate::config::AgentConfig`].

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "balancer-agent", about = "L4 load balancer control plane")]
pub struct Cli {
    /// Path to the agent's TOML configuration file.
    #[arg(long, env = "BALANCER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the REST bind address (env: BALANCER_BIND_ADDRESS).
    #[arg(long, env = "BALANCER_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Log filter directive passed to `tracing_subscriber::EnvFilter`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}
