//! CLI configuration layering.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use sessionvault_core::StoreConfig;
use std::path::Path;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "SESSIONVAULT_";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CliConfig {
    pub store: StoreTuning,
}

/// Pool settings applied on top of a connection string.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreTuning {
    /// SQLite busy timeout, seconds.
    pub query_timeout_secs: Option<u64>,
    pub max_connections: Option<u32>,
    pub statement_timeout_ms: Option<u64>,
    pub acquire_timeout_secs: Option<u64>,
}

impl StoreTuning {
    /// Build the store configuration for `db_url` with these overrides.
    pub fn store_config(&self, db_url: &str) -> Result<StoreConfig> {
        let mut config = StoreConfig::from_url(db_url)
            .with_context(|| format!("invalid destination '{db_url}'"))?;

        match &mut config {
            StoreConfig::Sqlite {
                query_timeout_secs, ..
            } => {
                if let Some(secs) = self.query_timeout_secs {
                    *query_timeout_secs = secs;
                }
            }
            StoreConfig::Postgres {
                max_connections,
                statement_timeout_ms,
                acquire_timeout_secs,
                ..
            } => {
                if let Some(max) = self.max_connections {
                    *max_connections = max;
                }
                if let Some(ms) = self.statement_timeout_ms {
                    *statement_timeout_ms = Some(ms);
                }
                if let Some(secs) = self.acquire_timeout_secs {
                    *acquire_timeout_secs = secs;
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Load configuration from an optional TOML file, then the environment.
pub fn load(path: Option<&Path>) -> Result<CliConfig> {
    let mut figment = Figment::new();

    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        tracing::debug!(config_path = %path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")
}
