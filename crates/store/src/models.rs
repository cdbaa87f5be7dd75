//! Database models mapping to the session schema.

use crate::error::StoreResult;
use sessionvault_core::{AuthKey, EntityRef, FileReference, PeerEntry, UpdateCursor};
use sqlx::FromRow;

// =============================================================================
// Sessions
// =============================================================================

/// Per-session connection record.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct SessionRow {
    pub session_name: String,
    pub dc_id: i32,
    pub server_address: Option<String>,
    pub port: Option<i32>,
    /// Empty when the session is not authenticated.
    pub auth_key: Vec<u8>,
    pub takeout_id: Option<i64>,
}

impl SessionRow {
    /// Stored auth key, if any.
    pub fn auth_key(&self) -> Option<AuthKey> {
        AuthKey::from_stored(self.auth_key.clone())
    }
}

/// Rows removed when a session is destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionDeleteStats {
    pub sessions: u64,
    pub entities: u64,
    pub update_states: u64,
    pub sent_files: u64,
}

impl SessionDeleteStats {
    pub fn total(&self) -> u64 {
        self.sessions + self.entities + self.update_states + self.sent_files
    }
}

// =============================================================================
// Entities
// =============================================================================

/// Cached entity record.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct EntityRow {
    pub session_name: String,
    pub id: i64,
    pub hash: i64,
    /// Lowercase. Cleared when a more recently touched row claims the same value.
    pub username: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    /// Last-touched time, unix seconds.
    pub date: Option<i64>,
}

impl EntityRow {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            id: self.id,
            hash: self.hash,
        }
    }
}

/// An entity write with an explicit last-touched time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityWrite {
    pub entry: PeerEntry,
    /// Unix seconds.
    pub date: i64,
}

impl EntityWrite {
    pub fn new(entry: PeerEntry, date: i64) -> Self {
        Self { entry, date }
    }
}

// =============================================================================
// Update state
// =============================================================================

/// Delivery cursor record for one update source.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct UpdateStateRow {
    pub session_name: String,
    pub id: i64,
    pub pts: i32,
    pub qts: i32,
    pub date: Option<i64>,
    pub seq: i32,
}

impl UpdateStateRow {
    pub fn cursor(&self) -> UpdateCursor {
        UpdateCursor::from_columns(self.pts, self.qts, self.date, self.seq)
    }
}

// =============================================================================
// Sent files
// =============================================================================

/// File cache record keyed by content digest, size and kind.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct SentFileRow {
    pub session_name: String,
    pub md5_digest: Vec<u8>,
    pub file_size: i64,
    #[sqlx(rename = "type")]
    pub kind: i32,
    pub id: i64,
    pub hash: i64,
}

impl SentFileRow {
    pub fn reference(&self) -> StoreResult<FileReference> {
        Ok(FileReference::from_raw(self.kind, self.id, self.hash)?)
    }
}
