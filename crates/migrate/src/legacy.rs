//! Read-only access to legacy session databases.

use crate::error::{MigrateError, MigrateResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const SESSIONS_TABLE: &str = "sessions";
pub const ENTITIES_TABLE: &str = "entities";
pub const UPDATE_STATE_TABLE: &str = "update_state";
pub const SENT_FILES_TABLE: &str = "sent_files";

/// The single connection record of a legacy file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySessionRecord {
    pub dc_id: i64,
    pub server_address: Option<String>,
    pub port: Option<i64>,
    /// Raw key bytes, empty when the session never authenticated.
    pub auth_key: Vec<u8>,
    pub takeout_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyEntity {
    pub id: i64,
    pub hash: i64,
    pub username: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    /// Unix seconds. Old rows carry none, or zero.
    pub date: Option<i64>,
}

impl LegacyEntity {
    /// The stored timestamp, treating zero as missing.
    pub fn known_date(&self) -> Option<i64> {
        self.date.filter(|d| *d != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyUpdateState {
    pub id: i64,
    pub pts: i32,
    pub qts: i32,
    pub date: Option<i64>,
    pub seq: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySentFile {
    pub md5_digest: Vec<u8>,
    pub file_size: i64,
    /// Raw type code as stored; not necessarily a known kind.
    pub kind: i64,
    pub id: i64,
    pub hash: i64,
}

/// Everything a legacy file holds, read in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacySnapshot {
    pub session: Option<LegacySessionRecord>,
    pub entities: Vec<LegacyEntity>,
    pub update_states: Vec<LegacyUpdateState>,
    pub sent_files: Vec<LegacySentFile>,
    /// Tables absent from the file, read as zero rows.
    pub missing_tables: Vec<&'static str>,
}

/// An open legacy session file.
pub struct LegacySource {
    path: PathBuf,
    conn: SqliteConnection,
}

impl LegacySource {
    /// Open a legacy file read-only.
    ///
    /// Fails with `SourceNotFound` if nothing exists at `path`.
    pub async fn open(path: &Path) -> MigrateResult<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Err(MigrateError::SourceNotFound(path.to_path_buf()));
        }

        let conn = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false)
            .connect()
            .await
            .map_err(MigrateError::Legacy)?;

        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every table, closing the file afterwards.
    pub async fn read_snapshot(mut self) -> MigrateResult<LegacySnapshot> {
        let result = self.read_tables().await;
        if let Err(e) = self.conn.close().await {
            warn!(path = %self.path.display(), error = %e, "Failed to close legacy source");
        }
        result
    }

    async fn read_tables(&mut self) -> MigrateResult<LegacySnapshot> {
        let mut snapshot = LegacySnapshot::default();

        if self.table_exists(SESSIONS_TABLE).await? {
            snapshot.session = self.read_session().await?;
        } else {
            snapshot.missing_tables.push(SESSIONS_TABLE);
        }

        if self.table_exists(ENTITIES_TABLE).await? {
            snapshot.entities = self.read_entities().await?;
        } else {
            snapshot.missing_tables.push(ENTITIES_TABLE);
        }

        if self.table_exists(UPDATE_STATE_TABLE).await? {
            snapshot.update_states = self.read_update_states().await?;
        } else {
            snapshot.missing_tables.push(UPDATE_STATE_TABLE);
        }

        if self.table_exists(SENT_FILES_TABLE).await? {
            snapshot.sent_files = self.read_sent_files().await?;
        } else {
            snapshot.missing_tables.push(SENT_FILES_TABLE);
        }

        for table in &snapshot.missing_tables {
            warn!(
                path = %self.path.display(),
                table = *table,
                "Legacy table missing, treating as empty"
            );
        }

        Ok(snapshot)
    }

    async fn table_exists(&mut self, table: &str) -> MigrateResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&mut self.conn)
        .await
        .map_err(MigrateError::Legacy)?;
        Ok(count > 0)
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> MigrateResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
                .bind(table)
                .bind(column)
                .fetch_one(&mut self.conn)
                .await
                .map_err(MigrateError::Legacy)?;
        Ok(count > 0)
    }

    /// `column` if the table has it, otherwise a NULL placeholder.
    async fn optional_column(&mut self, table: &str, column: &str) -> MigrateResult<String> {
        if self.column_exists(table, column).await? {
            return Ok(column.to_string());
        }
        warn!(
            path = %self.path.display(),
            table = table,
            column = column,
            "Legacy column missing, reading as NULL"
        );
        Ok(format!("NULL AS {column}"))
    }

    async fn read_session(&mut self) -> MigrateResult<Option<LegacySessionRecord>> {
        let takeout_id = self.optional_column(SESSIONS_TABLE, "takeout_id").await?;
        let query = format!(
            "SELECT dc_id, server_address, port, auth_key, {takeout_id} FROM sessions LIMIT 1"
        );
        let row: Option<(i64, Option<String>, Option<i64>, Option<Vec<u8>>, Option<i64>)> =
            sqlx::query_as(&query)
                .fetch_optional(&mut self.conn)
                .await
                .map_err(MigrateError::Legacy)?;

        Ok(
            row.map(|(dc_id, server_address, port, auth_key, takeout_id)| LegacySessionRecord {
                dc_id,
                server_address,
                port,
                auth_key: auth_key.unwrap_or_default(),
                takeout_id,
            }),
        )
    }

    async fn read_entities(&mut self) -> MigrateResult<Vec<LegacyEntity>> {
        let date = self.optional_column(ENTITIES_TABLE, "date").await?;
        // Phone numbers were declared INTEGER.
        let query = format!(
            "SELECT id, hash, username, CAST(phone AS TEXT), name, {date} FROM entities ORDER BY id"
        );
        let rows: Vec<(i64, i64, Option<String>, Option<String>, Option<String>, Option<i64>)> =
            sqlx::query_as(&query)
                .fetch_all(&mut self.conn)
                .await
                .map_err(MigrateError::Legacy)?;

        Ok(rows
            .into_iter()
            .map(|(id, hash, username, phone, name, date)| LegacyEntity {
                id,
                hash,
                username,
                phone,
                name,
                date,
            })
            .collect())
    }

    async fn read_update_states(&mut self) -> MigrateResult<Vec<LegacyUpdateState>> {
        let rows: Vec<(i64, i32, i32, Option<i64>, i32)> = sqlx::query_as(
            r#"
            SELECT id, COALESCE(pts, 0), COALESCE(qts, 0), date, COALESCE(seq, 0)
            FROM update_state
            ORDER BY id
            "#,
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(MigrateError::Legacy)?;

        Ok(rows
            .into_iter()
            .map(|(id, pts, qts, date, seq)| LegacyUpdateState {
                id,
                pts,
                qts,
                date,
                seq,
            })
            .collect())
    }

    async fn read_sent_files(&mut self) -> MigrateResult<Vec<LegacySentFile>> {
        let rows: Vec<(Vec<u8>, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT md5_digest, file_size, type, id, hash FROM sent_files",
        )
        .fetch_all(&mut self.conn)
        .await
        .map_err(MigrateError::Legacy)?;

        Ok(rows
            .into_iter()
            .map(|(md5_digest, file_size, kind, id, hash)| LegacySentFile {
                md5_digest,
                file_size,
                kind,
                id,
                hash,
            })
            .collect())
    }
}
