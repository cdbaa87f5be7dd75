//! Store connection configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Relational store configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// SQLite database file, or `:memory:`.
    Sqlite {
        path: PathBuf,
        /// Busy timeout in seconds. SQLite waits this long for a competing
        /// writer before the operation fails; it cannot cancel a running query.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: u64,
    },
    /// PostgreSQL database shared by many sessions.
    Postgres {
        /// Connection URL.
        url: String,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds, enforced by the server.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
        /// How long to wait for a pooled connection, in seconds.
        #[serde(default = "default_acquire_timeout_secs")]
        acquire_timeout_secs: u64,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30_000)
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_sqlite_query_timeout_secs() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./sessions.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl StoreConfig {
    /// Build a configuration from a connection string with default pool settings.
    ///
    /// Accepts `sqlite:<path>`, `sqlite://<path>`, `sqlite::memory:`,
    /// `postgres://...` and `postgresql://...`.
    pub fn from_url(url: &str) -> Result<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Self::Postgres {
                url: url.to_string(),
                max_connections: default_max_connections(),
                statement_timeout_ms: default_statement_timeout_ms(),
                acquire_timeout_secs: default_acquire_timeout_secs(),
            });
        }

        if let Some(rest) = url.strip_prefix("sqlite:") {
            let rest = rest.strip_prefix("//").unwrap_or(rest);
            let path = rest.split('?').next().unwrap_or_default();
            if path.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "sqlite url '{url}' has no database path"
                )));
            }
            return Ok(Self::Sqlite {
                path: PathBuf::from(path),
                query_timeout_secs: default_sqlite_query_timeout_secs(),
            });
        }

        Err(Error::InvalidConfig(format!(
            "unsupported connection string '{url}': expected sqlite: or postgres://"
        )))
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<()> {
        match self {
            StoreConfig::Sqlite { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(Error::InvalidConfig(
                        "sqlite config requires a non-empty 'path'".to_string(),
                    ));
                }
                Ok(())
            }
            StoreConfig::Postgres {
                url,
                max_connections,
                ..
            } => {
                if url.is_empty() {
                    return Err(Error::InvalidConfig(
                        "postgres config requires 'url'".to_string(),
                    ));
                }
                if *max_connections == 0 {
                    return Err(Error::InvalidConfig(
                        "postgres 'max_connections' must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Backend name for log fields.
    pub fn backend(&self) -> &'static str {
        match self {
            StoreConfig::Sqlite { .. } => "sqlite",
            StoreConfig::Postgres { .. } => "postgres",
        }
    }
}
