//! Agent configuration: where to bind, and the managers to seed at
//! startup. TOML on disk, environment overrides on top — loading
//! hierarchy is `env > file > defaults`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use balancer_core::config::schema::BalancerConfigPatch;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default)]
    pub managers: BTreeMap<String, BalancerConfigPatch>,
}

fn default_bind_address() -> String {
    "0.0.0.0:7777".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            managers: BTreeMap::new(),
        }
    }
}

/// Loads the agent's configuration: a TOML file at `path` (if it exists),
/// with `BALANCER_*` environment variables applied on top.
pub fn load_config(path: Option<&Path>) -> Result<AgentConfig, ConfigError> {
    let mut config = match path {
        Some(p) if p.exists() => load_from_file(p)?,
        _ => AgentConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

pub fn load_from_file(path: &Path) -> Result<AgentConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Applies `BALANCER_BIND_ADDRESS` overrides. Per-manager config is not
/// override-able this way — managers are created and updated through the
/// control surface, not environment variables.
pub fn apply_env_overrides(config: &mut AgentConfig) -> Result<(), ConfigError> {
    if let Ok(bind) = std::env::var("BALANCER_BIND_ADDRESS") {
        config.bind_address = bind;
    }

    Ok(())
}
