//! Entity cache repository.

use crate::error::StoreResult;
use crate::models::{EntityRow, EntityWrite};
use async_trait::async_trait;
use sessionvault_core::{EntityRef, PeerEntry};
use time::OffsetDateTime;

/// Repository for the per-session entity resolution cache.
///
/// A non-null username belongs to at most one row per session. Writes that
/// introduce a collision clear the username on every colliding row except the
/// most recently touched one. Rows are never deleted by this repair; ties on
/// the timestamp keep the row with the higher peer id.
#[async_trait]
pub trait EntityRepo: Send + Sync {
    /// Upsert entities with explicit timestamps, then repair every username
    /// touched by the batch. Runs in one transaction.
    ///
    /// Returns the number of rows whose username was cleared.
    async fn write_entities(&self, session_name: &str, writes: &[EntityWrite])
    -> StoreResult<u64>;

    /// Upsert entities stamped with the current time.
    async fn upsert_entities(&self, session_name: &str, entries: &[PeerEntry]) -> StoreResult<u64> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let writes: Vec<EntityWrite> = entries
            .iter()
            .cloned()
            .map(|entry| EntityWrite::new(entry, now))
            .collect();
        self.write_entities(session_name, &writes).await
    }

    /// Most recently touched entity with this phone.
    async fn get_entity_by_phone(
        &self,
        session_name: &str,
        phone: &str,
    ) -> StoreResult<Option<EntityRef>>;

    /// Entity holding this username, matched case-insensitively.
    ///
    /// If several rows still share it, they are repaired before returning the
    /// most recently touched one.
    async fn get_entity_by_username(
        &self,
        session_name: &str,
        username: &str,
    ) -> StoreResult<Option<EntityRef>>;

    /// Most recently touched entity with this display name.
    async fn get_entity_by_name(
        &self,
        session_name: &str,
        name: &str,
    ) -> StoreResult<Option<EntityRef>>;

    /// Entity by id. When `exact` is false the id is treated as bare and
    /// matched under the user, chat and channel encodings.
    async fn get_entity_by_id(
        &self,
        session_name: &str,
        id: i64,
        exact: bool,
    ) -> StoreResult<Option<EntityRef>>;

    /// Full entity row.
    async fn get_entity(&self, session_name: &str, id: i64) -> StoreResult<Option<EntityRow>>;

    /// All entity rows of a session, ordered by id.
    async fn list_entities(&self, session_name: &str) -> StoreResult<Vec<EntityRow>>;
}
