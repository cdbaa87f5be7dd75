//! Session store trait and the SQLite implementation.

use crate::error::{StoreError, StoreResult};
use crate::repos::{EntityRepo, SentFileRepo, SessionRepo, UpdateStateRepo};
use async_trait::async_trait;
use sessionvault_core::DATABASE_VERSION;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined session store trait.
///
/// One store multiplexes any number of named sessions. The protocol client
/// normally talks to it through a [`crate::TenantSession`].
#[async_trait]
pub trait SessionStore:
    SessionRepo + EntityRepo + UpdateStateRepo + SentFileRepo + Send + Sync
{
    /// Create missing tables and make sure the version marker row exists.
    ///
    /// Idempotent and safe to race from several processes.
    async fn ensure_schema(&self) -> StoreResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> StoreResult<()>;

    /// Release the connection pool. Further calls fail with `StorageUnavailable`.
    async fn close(&self);

    /// Backend name for log fields.
    fn backend(&self) -> &'static str;
}

/// SQLite-based session store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open a SQLite store and bootstrap its schema.
    pub async fn new(path: impl AsRef<Path>, query_timeout_secs: Option<u64>) -> StoreResult<Self> {
        let store = Self::connect(path, query_timeout_secs).await?;
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Open the pool without touching the schema.
    pub async fn connect(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> StoreResult<Self> {
        let path = path.as_ref();
        let timeout = Duration::from_secs(query_timeout_secs.unwrap_or(5));
        let in_memory = path == Path::new(":memory:");

        if !in_memory {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Wait for competing writers instead of failing with "database is locked".
            .busy_timeout(timeout);

        let mut pool_opts = SqlitePoolOptions::new()
            // A single connection serializes writers, including the username repair.
            .max_connections(1)
            .acquire_timeout(timeout);
        if in_memory {
            // The database lives only as long as its one connection.
            pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_opts.connect_with(opts).await?;

        tracing::debug!(path = %path.display(), "Opened SQLite session store");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        // A legacy single-session file also has a `sessions` table, keyed by dc_id.
        let (columns, tenant_key): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(name = 'session_name'), 0) FROM pragma_table_info('sessions')",
        )
        .fetch_one(&self.pool)
        .await?;
        if columns > 0 && tenant_key == 0 {
            return Err(StoreError::Internal(
                "Incompatible database schema detected: sessions table has no session_name column. \
                 This looks like a legacy session file; migrate it instead of opening it as a store."
                    .to_string(),
            ));
        }

        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        sqlx::query("INSERT OR IGNORE INTO version (version) VALUES (?)")
            .bind(DATABASE_VERSION)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use sessionvault_core::{AuthKey, EntityRef, FileKind, FileReference, PeerKind, UpdateCursor};
    use sqlx::SqliteConnection;
    use std::collections::BTreeSet;

    /// Insert the default session row if it is missing.
    async fn insert_default_session(
        conn: &mut SqliteConnection,
        session_name: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_name, dc_id, auth_key)
            VALUES (?, 0, ?)
            ON CONFLICT(session_name) DO NOTHING
            "#,
        )
        .bind(session_name)
        .bind(Vec::<u8>::new())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Clear `username` on every row sharing it except the most recently
    /// touched one, and return that row.
    async fn resolve_username(
        conn: &mut SqliteConnection,
        session_name: &str,
        username: &str,
    ) -> StoreResult<(Option<EntityRef>, u64)> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, hash FROM entities
            WHERE session_name = ? AND username = ?
            ORDER BY date ASC NULLS FIRST, id ASC
            "#,
        )
        .bind(session_name)
        .bind(username)
        .fetch_all(&mut *conn)
        .await?;

        let Some((winner, losers)) = rows.split_last() else {
            return Ok((None, 0));
        };

        for (id, _) in losers {
            sqlx::query("UPDATE entities SET username = NULL WHERE session_name = ? AND id = ?")
                .bind(session_name)
                .bind(*id)
                .execute(&mut *conn)
                .await?;
        }

        if !losers.is_empty() {
            tracing::debug!(
                session_name = session_name,
                username = username,
                kept_id = winner.0,
                cleared = losers.len(),
                "Cleared duplicate username"
            );
        }

        Ok((Some(EntityRef::from(*winner)), losers.len() as u64))
    }

    #[async_trait]
    impl SessionRepo for SqliteStore {
        async fn get_or_create_session(&self, session_name: &str) -> StoreResult<SessionRow> {
            let mut conn = self.pool.acquire().await?;
            insert_default_session(&mut *conn, session_name).await?;
            let row = sqlx::query_as::<_, SessionRow>(
                "SELECT * FROM sessions WHERE session_name = ?",
            )
            .bind(session_name)
            .fetch_one(&mut *conn)
            .await?;
            Ok(row)
        }

        async fn get_session(&self, session_name: &str) -> StoreResult<Option<SessionRow>> {
            let row = sqlx::query_as::<_, SessionRow>(
                "SELECT * FROM sessions WHERE session_name = ?",
            )
            .bind(session_name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn set_endpoint(
            &self,
            session_name: &str,
            dc_id: i32,
            server_address: Option<&str>,
            port: Option<i32>,
        ) -> StoreResult<()> {
            sqlx::query(
                r#"
                INSERT INTO sessions (session_name, dc_id, server_address, port, auth_key)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(session_name) DO UPDATE SET
                    dc_id = excluded.dc_id,
                    server_address = excluded.server_address,
                    port = excluded.port
                "#,
            )
            .bind(session_name)
            .bind(dc_id)
            .bind(server_address)
            .bind(port)
            .bind(Vec::<u8>::new())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn set_auth_key(
            &self,
            session_name: &str,
            key: Option<&AuthKey>,
        ) -> StoreResult<()> {
            sqlx::query(
                r#"
                INSERT INTO sessions (session_name, dc_id, auth_key)
                VALUES (?, 0, ?)
                ON CONFLICT(session_name) DO UPDATE SET auth_key = excluded.auth_key
                "#,
            )
            .bind(session_name)
            .bind(AuthKey::to_stored(key))
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn set_takeout_id(
            &self,
            session_name: &str,
            takeout_id: Option<i64>,
        ) -> StoreResult<()> {
            sqlx::query(
                r#"
                INSERT INTO sessions (session_name, dc_id, auth_key, takeout_id)
                VALUES (?, 0, ?, ?)
                ON CONFLICT(session_name) DO UPDATE SET takeout_id = excluded.takeout_id
                "#,
            )
            .bind(session_name)
            .bind(Vec::<u8>::new())
            .bind(takeout_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_session_names(&self) -> StoreResult<BTreeSet<String>> {
            let table_exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='sessions')",
            )
            .fetch_one(&self.pool)
            .await?;
            if !table_exists {
                return Ok(BTreeSet::new());
            }

            let names: Vec<String> = sqlx::query_scalar("SELECT DISTINCT session_name FROM sessions")
                .fetch_all(&self.pool)
                .await?;
            Ok(names.into_iter().collect())
        }

        async fn delete_session(&self, session_name: &str) -> StoreResult<SessionDeleteStats> {
            let mut tx = self.pool.begin().await?;

            let sent_files = sqlx::query("DELETE FROM sent_files WHERE session_name = ?")
                .bind(session_name)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            let entities = sqlx::query("DELETE FROM entities WHERE session_name = ?")
                .bind(session_name)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            let update_states = sqlx::query("DELETE FROM update_state WHERE session_name = ?")
                .bind(session_name)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            let sessions = sqlx::query("DELETE FROM sessions WHERE session_name = ?")
                .bind(session_name)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            tx.commit().await?;

            Ok(SessionDeleteStats {
                sessions,
                entities,
                update_states,
                sent_files,
            })
        }
    }

    #[async_trait]
    impl EntityRepo for SqliteStore {
        async fn write_entities(
            &self,
            session_name: &str,
            writes: &[EntityWrite],
        ) -> StoreResult<u64> {
            if writes.is_empty() {
                return Ok(0);
            }

            let mut tx = self.pool.begin().await?;
            insert_default_session(&mut *tx, session_name).await?;

            let mut touched = BTreeSet::new();
            for write in writes {
                let username = write.entry.normalized_username();
                sqlx::query(
                    r#"
                    INSERT INTO entities (session_name, id, hash, username, phone, name, date)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(session_name, id) DO UPDATE SET
                        hash = excluded.hash,
                        username = excluded.username,
                        phone = excluded.phone,
                        name = excluded.name,
                        date = excluded.date
                    "#,
                )
                .bind(session_name)
                .bind(write.entry.id)
                .bind(write.entry.hash)
                .bind(&username)
                .bind(&write.entry.phone)
                .bind(&write.entry.name)
                .bind(write.date)
                .execute(&mut *tx)
                .await?;

                if let Some(username) = username {
                    touched.insert(username);
                }
            }

            let mut cleared = 0;
            for username in &touched {
                cleared += resolve_username(&mut *tx, session_name, username).await?.1;
            }

            tx.commit().await?;
            Ok(cleared)
        }

        async fn get_entity_by_phone(
            &self,
            session_name: &str,
            phone: &str,
        ) -> StoreResult<Option<EntityRef>> {
            let row: Option<(i64, i64)> = sqlx::query_as(
                r#"
                SELECT id, hash FROM entities
                WHERE session_name = ? AND phone = ?
                ORDER BY date DESC NULLS LAST, id DESC
                LIMIT 1
                "#,
            )
            .bind(session_name)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(EntityRef::from))
        }

        async fn get_entity_by_username(
            &self,
            session_name: &str,
            username: &str,
        ) -> StoreResult<Option<EntityRef>> {
            let username = username.to_lowercase();
            let rows: Vec<(i64, i64)> = sqlx::query_as(
                r#"
                SELECT id, hash FROM entities
                WHERE session_name = ? AND username = ?
                ORDER BY date ASC NULLS FIRST, id ASC
                "#,
            )
            .bind(session_name)
            .bind(&username)
            .fetch_all(&self.pool)
            .await?;

            match rows.as_slice() {
                [] => Ok(None),
                [only] => Ok(Some(EntityRef::from(*only))),
                _ => {
                    let mut tx = self.pool.begin().await?;
                    let (winner, _) = resolve_username(&mut *tx, session_name, &username).await?;
                    tx.commit().await?;
                    Ok(winner)
                }
            }
        }

        async fn get_entity_by_name(
            &self,
            session_name: &str,
            name: &str,
        ) -> StoreResult<Option<EntityRef>> {
            let row: Option<(i64, i64)> = sqlx::query_as(
                r#"
                SELECT id, hash FROM entities
                WHERE session_name = ? AND name = ?
                ORDER BY date DESC NULLS LAST, id DESC
                LIMIT 1
                "#,
            )
            .bind(session_name)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(EntityRef::from))
        }

        async fn get_entity_by_id(
            &self,
            session_name: &str,
            id: i64,
            exact: bool,
        ) -> StoreResult<Option<EntityRef>> {
            let ids = if exact {
                vec![id]
            } else {
                PeerKind::marked_candidates(id)
            };

            let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
            let query = format!(
                "SELECT id, hash FROM entities WHERE session_name = ? AND id IN ({}) \
                 ORDER BY date DESC NULLS LAST, id DESC LIMIT 1",
                placeholders.join(", ")
            );

            let mut query_builder = sqlx::query_as::<_, (i64, i64)>(&query).bind(session_name);
            for candidate in &ids {
                query_builder = query_builder.bind(*candidate);
            }

            let row = query_builder.fetch_optional(&self.pool).await?;
            Ok(row.map(EntityRef::from))
        }

        async fn get_entity(&self, session_name: &str, id: i64) -> StoreResult<Option<EntityRow>> {
            let row = sqlx::query_as::<_, EntityRow>(
                "SELECT * FROM entities WHERE session_name = ? AND id = ?",
            )
            .bind(session_name)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_entities(&self, session_name: &str) -> StoreResult<Vec<EntityRow>> {
            let rows = sqlx::query_as::<_, EntityRow>(
                "SELECT * FROM entities WHERE session_name = ? ORDER BY id",
            )
            .bind(session_name)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl UpdateStateRepo for SqliteStore {
        async fn get_update_state(
            &self,
            session_name: &str,
            source_id: i64,
        ) -> StoreResult<Option<UpdateCursor>> {
            let row = sqlx::query_as::<_, UpdateStateRow>(
                "SELECT * FROM update_state WHERE session_name = ? AND id = ?",
            )
            .bind(session_name)
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|r| r.cursor()))
        }

        async fn set_update_state(
            &self,
            session_name: &str,
            source_id: i64,
            cursor: &UpdateCursor,
        ) -> StoreResult<()> {
            sqlx::query(
                r#"
                INSERT INTO update_state (session_name, id, pts, qts, date, seq)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(session_name, id) DO UPDATE SET
                    pts = excluded.pts,
                    qts = excluded.qts,
                    date = excluded.date,
                    seq = excluded.seq
                "#,
            )
            .bind(session_name)
            .bind(source_id)
            .bind(cursor.pts)
            .bind(cursor.qts)
            .bind(cursor.date_unix())
            .bind(cursor.seq)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_update_states(
            &self,
            session_name: &str,
        ) -> StoreResult<Vec<(i64, UpdateCursor)>> {
            let rows = sqlx::query_as::<_, UpdateStateRow>(
                "SELECT * FROM update_state WHERE session_name = ?",
            )
            .bind(session_name)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.iter().map(|r| (r.id, r.cursor())).collect())
        }
    }

    #[async_trait]
    impl SentFileRepo for SqliteStore {
        async fn get_file(
            &self,
            session_name: &str,
            md5_digest: &[u8],
            file_size: i64,
            kind: FileKind,
        ) -> StoreResult<Option<FileReference>> {
            let row: Option<(i64, i64)> = sqlx::query_as(
                r#"
                SELECT id, hash FROM sent_files
                WHERE session_name = ? AND md5_digest = ? AND file_size = ? AND type = ?
                "#,
            )
            .bind(session_name)
            .bind(md5_digest)
            .bind(file_size)
            .bind(kind.code())
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(id, access_hash)| FileReference {
                kind,
                id,
                access_hash,
            }))
        }

        async fn cache_file(
            &self,
            session_name: &str,
            md5_digest: &[u8],
            file_size: i64,
            reference: &FileReference,
        ) -> StoreResult<()> {
            sqlx::query(
                r#"
                INSERT INTO sent_files (session_name, md5_digest, file_size, type, id, hash)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(session_name, md5_digest, file_size, type) DO UPDATE SET
                    id = excluded.id,
                    hash = excluded.hash
                "#,
            )
            .bind(session_name)
            .bind(md5_digest)
            .bind(file_size)
            .bind(reference.kind.code())
            .bind(reference.id)
            .bind(reference.access_hash)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_files(&self, session_name: &str) -> StoreResult<Vec<SentFileRow>> {
            let rows = sqlx::query_as::<_, SentFileRow>(
                "SELECT * FROM sent_files WHERE session_name = ? ORDER BY file_size, type",
            )
            .bind(session_name)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }
}

/// SQL schema for SQLite.
///
/// Table and column names match the layout legacy clients already read.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS version (
    version INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS sessions (
    session_name TEXT PRIMARY KEY,
    dc_id INTEGER NOT NULL DEFAULT 0,
    server_address TEXT,
    port INTEGER,
    auth_key BLOB NOT NULL DEFAULT X'',
    takeout_id INTEGER
);

CREATE TABLE IF NOT EXISTS entities (
    session_name TEXT NOT NULL,
    id INTEGER NOT NULL,
    hash INTEGER NOT NULL,
    username TEXT,
    phone TEXT,
    name TEXT,
    date INTEGER,
    PRIMARY KEY (session_name, id)
);
CREATE INDEX IF NOT EXISTS idx_entities_username ON entities(session_name, username);
CREATE INDEX IF NOT EXISTS idx_entities_phone ON entities(session_name, phone);
CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(session_name, name);

CREATE TABLE IF NOT EXISTS sent_files (
    session_name TEXT NOT NULL,
    md5_digest BLOB NOT NULL,
    file_size INTEGER NOT NULL,
    type INTEGER NOT NULL,
    id INTEGER NOT NULL,
    hash INTEGER NOT NULL,
    PRIMARY KEY (session_name, md5_digest, file_size, type)
);

CREATE TABLE IF NOT EXISTS update_state (
    session_name TEXT NOT NULL,
    id INTEGER NOT NULL,
    pts INTEGER NOT NULL,
    qts INTEGER NOT NULL,
    date INTEGER,
    seq INTEGER NOT NULL,
    PRIMARY KEY (session_name, id)
);
"#;
