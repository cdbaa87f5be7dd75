//! Delivery cursor repository.

use crate::error::StoreResult;
use async_trait::async_trait;
use sessionvault_core::UpdateCursor;

/// Repository for per-source update cursors.
#[async_trait]
pub trait UpdateStateRepo: Send + Sync {
    /// Get the cursor for an update source.
    async fn get_update_state(
        &self,
        session_name: &str,
        source_id: i64,
    ) -> StoreResult<Option<UpdateCursor>>;

    /// Upsert the cursor for an update source.
    async fn set_update_state(
        &self,
        session_name: &str,
        source_id: i64,
        cursor: &UpdateCursor,
    ) -> StoreResult<()>;

    /// All cursors of a session. Order is unspecified.
    async fn list_update_states(&self, session_name: &str)
    -> StoreResult<Vec<(i64, UpdateCursor)>>;
}
