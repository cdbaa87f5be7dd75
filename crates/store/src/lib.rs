//! Multi-tenant session store for protocol clients.
//!
//! Many named sessions share one relational database:
//! - Session records (datacenter endpoint, auth key, takeout id)
//! - Entity resolution cache with per-session username uniqueness
//! - Update delivery cursors
//! - Content-addressed cache of uploaded files

pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod session;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use postgres::PostgresStore;
pub use repos::{EntityRepo, SentFileRepo, SessionRepo, UpdateStateRepo};
pub use session::{ClientSession, TenantSession};
pub use store::{SessionStore, SqliteStore};

use sessionvault_core::StoreConfig;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Open a store from configuration without bootstrapping its schema.
async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn SessionStore>> {
    config.validate()?;
    match config {
        StoreConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::connect(path, Some(*query_timeout_secs)).await?;
            Ok(Arc::new(store) as Arc<dyn SessionStore>)
        }
        StoreConfig::Postgres {
            url,
            max_connections,
            statement_timeout_ms,
            acquire_timeout_secs,
        } => {
            tracing::info!("Connecting to PostgreSQL using connection URL");
            let store = PostgresStore::connect(
                url,
                *max_connections,
                *statement_timeout_ms,
                Some(Duration::from_secs(*acquire_timeout_secs)),
            )
            .await?;
            Ok(Arc::new(store) as Arc<dyn SessionStore>)
        }
    }
}

/// Create a session store from configuration and bootstrap its schema.
pub async fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn SessionStore>> {
    let store = connect(config).await?;
    store.ensure_schema().await?;
    tracing::debug!(backend = store.backend(), "Session store ready");
    Ok(store)
}

/// List the session names in a store without creating its schema.
///
/// A database that was never bootstrapped yields an empty set.
pub async fn list_sessions(config: &StoreConfig) -> StoreResult<BTreeSet<String>> {
    let store = connect(config).await?;
    let names = store.list_session_names().await;
    store.close().await;
    names
}
