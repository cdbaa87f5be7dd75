//! Legacy fixture builders for migration tests.

#![allow(dead_code)]

use sessionvault_store::{SessionStore, SqliteStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const SESSIONS_DDL: &str = "CREATE TABLE sessions (dc_id INTEGER PRIMARY KEY, server_address TEXT, port INTEGER, auth_key BLOB, takeout_id INTEGER)";
pub const ENTITIES_DDL: &str = "CREATE TABLE entities (id INTEGER PRIMARY KEY, hash INTEGER NOT NULL, username TEXT, phone INTEGER, name TEXT, date INTEGER)";
pub const UPDATE_STATE_DDL: &str = "CREATE TABLE update_state (id INTEGER PRIMARY KEY, pts INTEGER, qts INTEGER, date INTEGER, seq INTEGER)";
pub const SENT_FILES_DDL: &str = "CREATE TABLE sent_files (md5_digest BLOB, file_size INTEGER, type INTEGER, id INTEGER, hash INTEGER, PRIMARY KEY(md5_digest, file_size, type))";

/// A destination store plus a scratch directory for legacy files.
pub struct MigrationEnv {
    pub store: Arc<SqliteStore>,
    pub dir: TempDir,
}

impl MigrationEnv {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(&dir.path().join("dest.db"), None)
            .await
            .expect("Failed to create destination store");
        Self {
            store: Arc::new(store),
            dir,
        }
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    /// Directory for legacy files, separate from the destination database.
    pub async fn legacy_dir(&self) -> PathBuf {
        let path = self.dir.path().join("legacy");
        tokio::fs::create_dir_all(&path).await.unwrap();
        path
    }
}

/// Builder for a legacy session database on disk.
pub struct LegacyFixture {
    pub path: PathBuf,
    conn: SqliteConnection,
}

impl LegacyFixture {
    /// Create an empty legacy file with no tables.
    pub async fn empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let conn = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .connect()
            .await
            .expect("Failed to create legacy fixture");
        Self { path, conn }
    }

    /// Create a legacy file with the full four-table layout.
    pub async fn create(path: impl AsRef<Path>) -> Self {
        let mut fixture = Self::empty(path).await;
        for ddl in [SESSIONS_DDL, ENTITIES_DDL, UPDATE_STATE_DDL, SENT_FILES_DDL] {
            fixture.exec(ddl).await;
        }
        fixture
    }

    pub async fn exec(&mut self, sql: &str) {
        sqlx::query(sql).execute(&mut self.conn).await.unwrap();
    }

    pub async fn session(
        &mut self,
        dc_id: i64,
        address: &str,
        port: i64,
        auth_key: &[u8],
        takeout_id: Option<i64>,
    ) {
        sqlx::query("INSERT INTO sessions VALUES (?, ?, ?, ?, ?)")
            .bind(dc_id)
            .bind(address)
            .bind(port)
            .bind(auth_key)
            .bind(takeout_id)
            .execute(&mut self.conn)
            .await
            .unwrap();
    }

    pub async fn entity(
        &mut self,
        id: i64,
        hash: i64,
        username: Option<&str>,
        phone: Option<i64>,
        name: Option<&str>,
        date: Option<i64>,
    ) {
        sqlx::query("INSERT INTO entities VALUES (?, ?, ?, ?, ?, ?)")
            .bind(id)
            .bind(hash)
            .bind(username)
            .bind(phone)
            .bind(name)
            .bind(date)
            .execute(&mut self.conn)
            .await
            .unwrap();
    }

    pub async fn update_state(&mut self, id: i64, pts: i64, qts: i64, date: i64, seq: i64) {
        sqlx::query("INSERT INTO update_state VALUES (?, ?, ?, ?, ?)")
            .bind(id)
            .bind(pts)
            .bind(qts)
            .bind(date)
            .bind(seq)
            .execute(&mut self.conn)
            .await
            .unwrap();
    }

    pub async fn sent_file(&mut self, digest: &[u8], size: i64, kind: i64, id: i64, hash: i64) {
        sqlx::query("INSERT INTO sent_files VALUES (?, ?, ?, ?, ?)")
            .bind(digest)
            .bind(size)
            .bind(kind)
            .bind(id)
            .bind(hash)
            .execute(&mut self.conn)
            .await
            .unwrap();
    }

    /// Flush and close, returning the file path.
    pub async fn finish(self) -> PathBuf {
        self.conn.close().await.unwrap();
        self.path
    }
}
