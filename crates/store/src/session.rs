//! A store handle bound to one session name.

use crate::error::StoreResult;
use crate::models::SessionDeleteStats;
use crate::store::SessionStore;
use async_trait::async_trait;
use sessionvault_core::{
    AuthKey, EntityRef, FileKind, FileReference, PeerEntry, UpdateCursor,
};
use std::sync::Arc;

/// Capabilities the protocol client needs from its session storage.
///
/// Endpoint and key getters read the values loaded when the session was
/// opened. Every setter persists before it returns.
#[async_trait]
pub trait ClientSession: Send + Sync {
    fn session_name(&self) -> &str;
    fn dc_id(&self) -> i32;
    fn server_address(&self) -> Option<&str>;
    fn port(&self) -> Option<i32>;
    fn auth_key(&self) -> Option<&AuthKey>;
    fn takeout_id(&self) -> Option<i64>;

    async fn set_dc(
        &mut self,
        dc_id: i32,
        server_address: Option<String>,
        port: Option<i32>,
    ) -> StoreResult<()>;
    async fn set_auth_key(&mut self, key: Option<AuthKey>) -> StoreResult<()>;
    async fn set_takeout_id(&mut self, takeout_id: Option<i64>) -> StoreResult<()>;

    async fn process_entities(&self, entries: &[PeerEntry]) -> StoreResult<()>;
    async fn get_entity_rows_by_phone(&self, phone: &str) -> StoreResult<Option<EntityRef>>;
    async fn get_entity_rows_by_username(&self, username: &str)
    -> StoreResult<Option<EntityRef>>;
    async fn get_entity_rows_by_name(&self, name: &str) -> StoreResult<Option<EntityRef>>;
    async fn get_entity_rows_by_id(&self, id: i64, exact: bool)
    -> StoreResult<Option<EntityRef>>;

    async fn get_update_state(&self, source_id: i64) -> StoreResult<Option<UpdateCursor>>;
    async fn set_update_state(&self, source_id: i64, cursor: &UpdateCursor) -> StoreResult<()>;
    async fn get_update_states(&self) -> StoreResult<Vec<(i64, UpdateCursor)>>;

    async fn get_file(
        &self,
        md5_digest: &[u8],
        file_size: i64,
        kind: FileKind,
    ) -> StoreResult<Option<FileReference>>;
    async fn cache_file(
        &self,
        md5_digest: &[u8],
        file_size: i64,
        reference: &FileReference,
    ) -> StoreResult<()>;

    /// Nothing to flush: every mutation has already committed.
    async fn save(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Destroy the session and all of its rows.
    async fn delete(&self) -> StoreResult<SessionDeleteStats>;
}

/// A [`SessionStore`] scoped to one session name.
///
/// Many tenants can share one store; each gets its own `TenantSession`.
pub struct TenantSession {
    store: Arc<dyn SessionStore>,
    session_name: String,
    dc_id: i32,
    server_address: Option<String>,
    port: Option<i32>,
    auth_key: Option<AuthKey>,
    takeout_id: Option<i64>,
    /// When false, `process_entities` discards what it is given.
    pub save_entities: bool,
}

impl TenantSession {
    /// Open a session, creating its record with defaults if it is new.
    pub async fn open(
        store: Arc<dyn SessionStore>,
        session_name: impl Into<String>,
    ) -> StoreResult<Self> {
        let session_name = session_name.into();
        let row = store.get_or_create_session(&session_name).await?;

        tracing::debug!(
            session_name = %session_name,
            dc_id = row.dc_id,
            authorized = !row.auth_key.is_empty(),
            "Opened session"
        );

        Ok(Self {
            auth_key: row.auth_key(),
            dc_id: row.dc_id,
            server_address: row.server_address,
            port: row.port,
            takeout_id: row.takeout_id,
            store,
            session_name,
            save_entities: true,
        })
    }

    /// The shared store backing this session.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }
}

#[async_trait]
impl ClientSession for TenantSession {
    fn session_name(&self) -> &str {
        &self.session_name
    }

    fn dc_id(&self) -> i32 {
        self.dc_id
    }

    fn server_address(&self) -> Option<&str> {
        self.server_address.as_deref()
    }

    fn port(&self) -> Option<i32> {
        self.port
    }

    fn auth_key(&self) -> Option<&AuthKey> {
        self.auth_key.as_ref()
    }

    fn takeout_id(&self) -> Option<i64> {
        self.takeout_id
    }

    async fn set_dc(
        &mut self,
        dc_id: i32,
        server_address: Option<String>,
        port: Option<i32>,
    ) -> StoreResult<()> {
        self.store
            .set_endpoint(&self.session_name, dc_id, server_address.as_deref(), port)
            .await?;
        self.dc_id = dc_id;
        self.server_address = server_address;
        self.port = port;

        // One key per session row: switching datacenters picks up whatever
        // key the row currently holds.
        self.auth_key = self
            .store
            .get_session(&self.session_name)
            .await?
            .and_then(|row| row.auth_key());
        Ok(())
    }

    async fn set_auth_key(&mut self, key: Option<AuthKey>) -> StoreResult<()> {
        let key = key.filter(|k| !k.is_empty());
        self.store
            .set_auth_key(&self.session_name, key.as_ref())
            .await?;
        self.auth_key = key;
        Ok(())
    }

    async fn set_takeout_id(&mut self, takeout_id: Option<i64>) -> StoreResult<()> {
        self.store
            .set_takeout_id(&self.session_name, takeout_id)
            .await?;
        self.takeout_id = takeout_id;
        Ok(())
    }

    async fn process_entities(&self, entries: &[PeerEntry]) -> StoreResult<()> {
        if !self.save_entities || entries.is_empty() {
            return Ok(());
        }
        self.store
            .upsert_entities(&self.session_name, entries)
            .await?;
        Ok(())
    }

    async fn get_entity_rows_by_phone(&self, phone: &str) -> StoreResult<Option<EntityRef>> {
        self.store
            .get_entity_by_phone(&self.session_name, phone)
            .await
    }

    async fn get_entity_rows_by_username(
        &self,
        username: &str,
    ) -> StoreResult<Option<EntityRef>> {
        self.store
            .get_entity_by_username(&self.session_name, username)
            .await
    }

    async fn get_entity_rows_by_name(&self, name: &str) -> StoreResult<Option<EntityRef>> {
        self.store
            .get_entity_by_name(&self.session_name, name)
            .await
    }

    async fn get_entity_rows_by_id(
        &self,
        id: i64,
        exact: bool,
    ) -> StoreResult<Option<EntityRef>> {
        self.store
            .get_entity_by_id(&self.session_name, id, exact)
            .await
    }

    async fn get_update_state(&self, source_id: i64) -> StoreResult<Option<UpdateCursor>> {
        self.store
            .get_update_state(&self.session_name, source_id)
            .await
    }

    async fn set_update_state(&self, source_id: i64, cursor: &UpdateCursor) -> StoreResult<()> {
        self.store
            .set_update_state(&self.session_name, source_id, cursor)
            .await
    }

    async fn get_update_states(&self) -> StoreResult<Vec<(i64, UpdateCursor)>> {
        self.store.list_update_states(&self.session_name).await
    }

    async fn get_file(
        &self,
        md5_digest: &[u8],
        file_size: i64,
        kind: FileKind,
    ) -> StoreResult<Option<FileReference>> {
        self.store
            .get_file(&self.session_name, md5_digest, file_size, kind)
            .await
    }

    async fn cache_file(
        &self,
        md5_digest: &[u8],
        file_size: i64,
        reference: &FileReference,
    ) -> StoreResult<()> {
        self.store
            .cache_file(&self.session_name, md5_digest, file_size, reference)
            .await
    }

    async fn delete(&self) -> StoreResult<SessionDeleteStats> {
        let stats = self.store.delete_session(&self.session_name).await?;
        tracing::info!(
            session_name = %self.session_name,
            rows = stats.total(),
            "Deleted session"
        );
        Ok(stats)
    }
}
