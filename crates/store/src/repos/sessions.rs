//! Session record repository.

use crate::error::StoreResult;
use crate::models::{SessionDeleteStats, SessionRow};
use async_trait::async_trait;
use sessionvault_core::AuthKey;
use std::collections::BTreeSet;

/// Repository for per-session connection records.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// Return the session row, inserting a default one if absent.
    ///
    /// The insert is a conditional upsert, so concurrent callers never
    /// produce two rows for the same name.
    async fn get_or_create_session(&self, session_name: &str) -> StoreResult<SessionRow>;

    /// Get a session row without creating it.
    async fn get_session(&self, session_name: &str) -> StoreResult<Option<SessionRow>>;

    /// Persist the datacenter endpoint.
    async fn set_endpoint(
        &self,
        session_name: &str,
        dc_id: i32,
        server_address: Option<&str>,
        port: Option<i32>,
    ) -> StoreResult<()>;

    /// Persist the auth key. `None` is stored as empty bytes.
    async fn set_auth_key(&self, session_name: &str, key: Option<&AuthKey>) -> StoreResult<()>;

    /// Persist the takeout id.
    async fn set_takeout_id(&self, session_name: &str, takeout_id: Option<i64>)
    -> StoreResult<()>;

    /// All session names in the store, empty if the schema does not exist yet.
    async fn list_session_names(&self) -> StoreResult<BTreeSet<String>>;

    /// Check whether a session row exists.
    async fn session_exists(&self, session_name: &str) -> StoreResult<bool> {
        Ok(self.get_session(session_name).await?.is_some())
    }

    /// Delete the session and every per-session row atomically.
    async fn delete_session(&self, session_name: &str) -> StoreResult<SessionDeleteStats>;
}
