//! PostgreSQL-based session store implementation.

use crate::error::StoreResult;
use crate::models::*;
use crate::repos::{EntityRepo, SentFileRepo, SessionRepo, UpdateStateRepo};
use crate::store::SessionStore;
use async_trait::async_trait;
use sessionvault_core::{
    AuthKey, DATABASE_VERSION, EntityRef, FileKind, FileReference, PeerKind, UpdateCursor,
};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgConnection, Pool, Postgres};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Advisory lock key serializing schema bootstrap across processes.
const SCHEMA_LOCK_KEY: i64 = 0x5345_5353_494f_4e53;

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// PostgreSQL-based session store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect and bootstrap the schema.
    pub async fn new(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> StoreResult<Self> {
        let store = Self::connect(url, max_connections, statement_timeout_ms, None).await?;
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Open the pool without touching the schema.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
        acquire_timeout: Option<Duration>,
    ) -> StoreResult<Self> {
        let mut opts = PgConnectOptions::from_str(url)?;

        // The server cancels statements past this bound; the surrounding
        // transaction then rolls back.
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout.unwrap_or(Duration::from_secs(30)))
            .connect_with(opts)
            .await?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for PostgresStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        // CREATE ... IF NOT EXISTS still races on the catalog when two
        // processes bootstrap at once, so hold a transaction-scoped lock.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        // PostgreSQL doesn't allow multiple statements in a single prepared statement,
        // so we split the schema and execute each statement separately.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query("INSERT INTO version (version) VALUES ($1) ON CONFLICT (version) DO NOTHING")
            .bind(DATABASE_VERSION)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
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
        "postgres"
    }
}

async fn insert_default_session(conn: &mut PgConnection, session_name: &str) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (session_name, dc_id, auth_key)
        VALUES ($1, 0, $2)
        ON CONFLICT (session_name) DO NOTHING
        "#,
    )
    .bind(session_name)
    .bind(Vec::<u8>::new())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Row-lock the session record so concurrent entity writers of the same
/// session serialize. Other sessions are unaffected.
async fn lock_session(conn: &mut PgConnection, session_name: &str) -> StoreResult<()> {
    insert_default_session(&mut *conn, session_name).await?;
    sqlx::query("SELECT session_name FROM sessions WHERE session_name = $1 FOR UPDATE")
        .bind(session_name)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Clear `username` on every row sharing it except the most recently touched
/// one, and return that row.
async fn resolve_username(
    conn: &mut PgConnection,
    session_name: &str,
    username: &str,
) -> StoreResult<(Option<EntityRef>, u64)> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT id, hash FROM entities
        WHERE session_name = $1 AND username = $2
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

    if !losers.is_empty() {
        let loser_ids: Vec<i64> = losers.iter().map(|(id, _)| *id).collect();
        sqlx::query(
            "UPDATE entities SET username = NULL WHERE session_name = $1 AND id = ANY($2)",
        )
        .bind(session_name)
        .bind(&loser_ids)
        .execute(&mut *conn)
        .await?;

        tracing::debug!(
            session_name = session_name,
            username = username,
            kept_id = winner.0,
            cleared = loser_ids.len(),
            "Cleared duplicate username"
        );
    }

    Ok((Some(EntityRef::from(*winner)), losers.len() as u64))
}

#[async_trait]
impl SessionRepo for PostgresStore {
    async fn get_or_create_session(&self, session_name: &str) -> StoreResult<SessionRow> {
        let mut conn = self.pool.acquire().await?;
        insert_default_session(&mut *conn, session_name).await?;
        let row =
            sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE session_name = $1")
                .bind(session_name)
                .fetch_one(&mut *conn)
                .await?;
        Ok(row)
    }

    async fn get_session(&self, session_name: &str) -> StoreResult<Option<SessionRow>> {
        let row =
            sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE session_name = $1")
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
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (session_name) DO UPDATE SET
                dc_id = EXCLUDED.dc_id,
                server_address = EXCLUDED.server_address,
                port = EXCLUDED.port
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

    async fn set_auth_key(&self, session_name: &str, key: Option<&AuthKey>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_name, dc_id, auth_key)
            VALUES ($1, 0, $2)
            ON CONFLICT (session_name) DO UPDATE SET auth_key = EXCLUDED.auth_key
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
            VALUES ($1, 0, $2, $3)
            ON CONFLICT (session_name) DO UPDATE SET takeout_id = EXCLUDED.takeout_id
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
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = 'sessions'
            )
            "#,
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

        let sent_files = sqlx::query("DELETE FROM sent_files WHERE session_name = $1")
            .bind(session_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let entities = sqlx::query("DELETE FROM entities WHERE session_name = $1")
            .bind(session_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let update_states = sqlx::query("DELETE FROM update_state WHERE session_name = $1")
            .bind(session_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let sessions = sqlx::query("DELETE FROM sessions WHERE session_name = $1")
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
impl EntityRepo for PostgresStore {
    async fn write_entities(
        &self,
        session_name: &str,
        writes: &[EntityWrite],
    ) -> StoreResult<u64> {
        if writes.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        lock_session(&mut *tx, session_name).await?;

        let mut touched = BTreeSet::new();
        for write in writes {
            let username = write.entry.normalized_username();
            sqlx::query(
                r#"
                INSERT INTO entities (session_name, id, hash, username, phone, name, date)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (session_name, id) DO UPDATE SET
                    hash = EXCLUDED.hash,
                    username = EXCLUDED.username,
                    phone = EXCLUDED.phone,
                    name = EXCLUDED.name,
                    date = EXCLUDED.date
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
            WHERE session_name = $1 AND phone = $2
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
            WHERE session_name = $1 AND username = $2
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
                lock_session(&mut *tx, session_name).await?;
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
            WHERE session_name = $1 AND name = $2
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

        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT id, hash FROM entities
            WHERE session_name = $1 AND id = ANY($2)
            ORDER BY date DESC NULLS LAST, id DESC
            LIMIT 1
            "#,
        )
        .bind(session_name)
        .bind(&ids)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(EntityRef::from))
    }

    async fn get_entity(&self, session_name: &str, id: i64) -> StoreResult<Option<EntityRow>> {
        let row = sqlx::query_as::<_, EntityRow>(
            "SELECT * FROM entities WHERE session_name = $1 AND id = $2",
        )
        .bind(session_name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_entities(&self, session_name: &str) -> StoreResult<Vec<EntityRow>> {
        let rows = sqlx::query_as::<_, EntityRow>(
            "SELECT * FROM entities WHERE session_name = $1 ORDER BY id",
        )
        .bind(session_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl UpdateStateRepo for PostgresStore {
    async fn get_update_state(
        &self,
        session_name: &str,
        source_id: i64,
    ) -> StoreResult<Option<UpdateCursor>> {
        let row = sqlx::query_as::<_, UpdateStateRow>(
            "SELECT * FROM update_state WHERE session_name = $1 AND id = $2",
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
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_name, id) DO UPDATE SET
                pts = EXCLUDED.pts,
                qts = EXCLUDED.qts,
                date = EXCLUDED.date,
                seq = EXCLUDED.seq
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
            "SELECT * FROM update_state WHERE session_name = $1",
        )
        .bind(session_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| (r.id, r.cursor())).collect())
    }
}

#[async_trait]
impl SentFileRepo for PostgresStore {
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
            WHERE session_name = $1 AND md5_digest = $2 AND file_size = $3 AND type = $4
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
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (session_name, md5_digest, file_size, type) DO UPDATE SET
                id = EXCLUDED.id,
                hash = EXCLUDED.hash
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
            "SELECT * FROM sent_files WHERE session_name = $1 ORDER BY file_size, type",
        )
        .bind(session_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
