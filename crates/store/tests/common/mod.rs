//! Session store test utilities.

#![allow(dead_code)]

use sessionvault_store::{PostgresStore, SessionStore, SqliteStore, StoreError, StoreResult};
use std::sync::Arc;
use tempfile::TempDir;
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;

/// Stable prefix for Docker/container startup failures in Postgres test setup.
pub const POSTGRES_CONTAINER_START_ERR_PREFIX: &str = "postgres-container-start:";

/// A SQLite test store that removes its database on drop.
pub struct TestStore {
    pub store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

impl TestStore {
    pub async fn new() -> StoreResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("sessions.db");
        let store = SqliteStore::new(&db_path, None).await?;

        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }
}

/// PostgreSQL test store backed by a testcontainer.
pub struct PostgresTestStore {
    pub store: Arc<PostgresStore>,
    pub url: String,
    _container: ContainerAsync<Postgres>,
}

impl PostgresTestStore {
    pub async fn new() -> StoreResult<Self> {
        let container = Postgres::default()
            .with_tag("15-alpine")
            .start()
            .await
            .map_err(|e| {
                StoreError::Internal(format!(
                    "{} Failed to start PostgreSQL container: {e}",
                    POSTGRES_CONTAINER_START_ERR_PREFIX
                ))
            })?;

        let host = container.get_host().await.expect("Failed to get host");
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .expect("Failed to get port");

        // Default credentials from testcontainers-modules postgres
        let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);
        let store = PostgresStore::new(&url, 5, None).await?;

        Ok(Self {
            store: Arc::new(store),
            url,
            _container: container,
        })
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }
}

/// Try to create a PostgreSQL test store, skipping if Docker is unavailable
/// or SKIP_POSTGRES_TESTS is set.
pub async fn postgres_or_skip() -> Option<PostgresTestStore> {
    if std::env::var("SKIP_POSTGRES_TESTS").is_ok() {
        return None;
    }
    match PostgresTestStore::new().await {
        Ok(store) => Some(store),
        Err(err) => {
            let msg = err.to_string();
            if msg.contains(POSTGRES_CONTAINER_START_ERR_PREFIX) {
                eprintln!("Skipping PostgreSQL test (Docker unavailable): {msg}");
                None
            } else {
                panic!("PostgreSQL test setup failed: {msg}");
            }
        }
    }
}

/// Run a test against both SQLite and PostgreSQL backends.
pub async fn run_store_test_both<F, Fut>(test_fn: F)
where
    F: Fn(Arc<dyn SessionStore>) -> Fut + Clone,
    Fut: std::future::Future<Output = ()>,
{
    let sqlite = TestStore::new()
        .await
        .expect("Failed to create SQLite test store");
    test_fn.clone()(sqlite.store()).await;

    if let Some(postgres) = postgres_or_skip().await {
        test_fn(postgres.store()).await;
    }
}

/// Assert that no non-null username appears on more than one row.
pub async fn assert_usernames_unique(store: &Arc<dyn SessionStore>, session_name: &str) {
    let rows = store
        .list_entities(session_name)
        .await
        .expect("list entities failed");
    let mut seen = std::collections::HashSet::new();
    for row in rows.iter().filter(|r| r.username.is_some()) {
        assert!(
            seen.insert(row.username.clone()),
            "username {:?} held by more than one row in {session_name}",
            row.username
        );
    }
}
