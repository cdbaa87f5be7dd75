//! Single-file migration.

use crate::LEGACY_EXTENSION;
use crate::error::{MigrateError, MigrateResult};
use crate::legacy::{LegacyEntity, LegacySnapshot, LegacySource};
use sessionvault_core::{
    AuthKey, DEFAULT_SESSION_NAME, FileKind, FileReference, PeerEntry, UpdateCursor,
    normalize_username,
};
use sessionvault_store::SessionStore;
use sessionvault_store::models::EntityWrite;
use std::collections::HashMap;
use std::path::Path;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Summary of one imported legacy file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub session_name: String,
    /// Whether the legacy file carried a connection record.
    pub session_record: bool,
    pub entities: usize,
    pub update_states: usize,
    pub sent_files: usize,
    /// Cached uploads with an unrecognized type code.
    pub skipped_sent_files: usize,
    pub missing_tables: Vec<&'static str>,
}

/// Pick the destination session name for a legacy file.
///
/// An explicit non-empty name wins. Otherwise the file name is used with its
/// `.session` suffix removed, falling back to the default session name.
pub fn derive_session_name(path: &Path, explicit: Option<&str>) -> String {
    if let Some(name) = explicit.filter(|n| !n.is_empty()) {
        return name.to_string();
    }

    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = format!(".{LEGACY_EXTENSION}");
    let stem = base.strip_suffix(suffix.as_str()).unwrap_or(&base);

    if stem.is_empty() {
        DEFAULT_SESSION_NAME.to_string()
    } else {
        stem.to_string()
    }
}

/// Clear duplicate usernames among legacy rows.
///
/// The legacy format tolerated several rows with the same username. For each
/// case-insensitive username the most recently dated row keeps it; rows with
/// no date sort first and ties keep the higher peer id. Returns how many rows
/// lost their username.
pub(crate) fn reconcile_usernames(entities: &mut [LegacyEntity]) -> usize {
    let mut winners: HashMap<String, usize> = HashMap::new();
    let mut cleared = 0;

    for index in 0..entities.len() {
        let Some(username) = normalize_username(entities[index].username.as_deref()) else {
            entities[index].username = None;
            continue;
        };

        let loser = match winners.get(&username) {
            None => None,
            Some(&current) => {
                let incumbent = recency_key(&entities[current]);
                if recency_key(&entities[index]) > incumbent {
                    Some(current)
                } else {
                    Some(index)
                }
            }
        };

        match loser {
            Some(loser) => {
                entities[loser].username = None;
                cleared += 1;
                if loser != index {
                    entities[index].username = Some(username.clone());
                    winners.insert(username, index);
                }
            }
            None => {
                entities[index].username = Some(username.clone());
                winners.insert(username, index);
            }
        }
    }

    cleared
}

// `None` orders before `Some`, so undated rows lose to dated ones.
fn recency_key(entity: &LegacyEntity) -> (Option<i64>, i64) {
    (entity.known_date(), entity.id)
}

/// Import one legacy file into `store`.
///
/// The file is fully read before the destination is touched. If replay fails
/// for a session that did not exist beforehand, the partial session is
/// removed again.
pub async fn migrate_file(
    store: &dyn SessionStore,
    path: &Path,
    session_name: Option<&str>,
) -> MigrateResult<MigrationReport> {
    let source = LegacySource::open(path).await?;
    let session_name = derive_session_name(path, session_name);
    let snapshot = source.read_snapshot().await?;

    let existed = store.session_exists(&session_name).await?;
    store.get_or_create_session(&session_name).await?;

    match replay(store, &session_name, snapshot).await {
        Ok(report) => {
            info!(
                path = %path.display(),
                session_name = %session_name,
                entities = report.entities,
                update_states = report.update_states,
                sent_files = report.sent_files,
                "Migrated legacy session"
            );
            Ok(report)
        }
        Err(err) => {
            if !existed {
                if let Err(cleanup) = store.delete_session(&session_name).await {
                    warn!(
                        session_name = %session_name,
                        error = %cleanup,
                        "Failed to remove partially migrated session"
                    );
                }
            }
            Err(err)
        }
    }
}

async fn replay(
    store: &dyn SessionStore,
    session_name: &str,
    mut snapshot: LegacySnapshot,
) -> MigrateResult<MigrationReport> {
    let mut report = MigrationReport {
        session_name: session_name.to_string(),
        missing_tables: std::mem::take(&mut snapshot.missing_tables),
        ..Default::default()
    };

    if let Some(record) = &snapshot.session {
        let dc_id = i32::try_from(record.dc_id).map_err(|_| {
            MigrateError::InvalidLegacyData(format!("dc_id out of range: {}", record.dc_id))
        })?;
        let port = record
            .port
            .map(|p| {
                i32::try_from(p)
                    .map_err(|_| MigrateError::InvalidLegacyData(format!("port out of range: {p}")))
            })
            .transpose()?;

        store
            .set_endpoint(session_name, dc_id, record.server_address.as_deref(), port)
            .await?;
        if !record.auth_key.is_empty() {
            let key = AuthKey::from_bytes(record.auth_key.clone());
            store.set_auth_key(session_name, Some(&key)).await?;
        }
        store.set_takeout_id(session_name, record.takeout_id).await?;
        report.session_record = true;
    }

    let cleared = reconcile_usernames(&mut snapshot.entities);
    if cleared > 0 {
        debug!(
            session_name = session_name,
            cleared = cleared,
            "Cleared duplicate legacy usernames"
        );
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let writes: Vec<EntityWrite> = snapshot
        .entities
        .into_iter()
        .map(|entity| {
            let date = entity.known_date().unwrap_or(now);
            let mut entry = PeerEntry::new(entity.id, entity.hash);
            entry.username = entity.username;
            entry.phone = entity.phone;
            entry.name = entity.name;
            EntityWrite::new(entry, date)
        })
        .collect();
    store.write_entities(session_name, &writes).await?;
    report.entities = writes.len();

    for state in &snapshot.update_states {
        let cursor = UpdateCursor::from_columns(state.pts, state.qts, state.date, state.seq);
        store
            .set_update_state(session_name, state.id, &cursor)
            .await?;
        report.update_states += 1;
    }

    for file in &snapshot.sent_files {
        let known = i32::try_from(file.kind)
            .ok()
            .and_then(|code| FileKind::from_code(code).ok());
        let Some(kind) = known else {
            debug!(
                session_name = session_name,
                type_code = file.kind,
                "Skipping cached upload of unknown kind"
            );
            report.skipped_sent_files += 1;
            continue;
        };
        let reference = FileReference {
            kind,
            id: file.id,
            access_hash: file.hash,
        };
        store
            .cache_file(session_name, &file.md5_digest, file.file_size, &reference)
            .await?;
        report.sent_files += 1;
    }

    Ok(report)
}
