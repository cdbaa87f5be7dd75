//! Content-addressed file cache repository.

use crate::error::StoreResult;
use crate::models::SentFileRow;
use async_trait::async_trait;
use sessionvault_core::{FileKind, FileReference};

/// Repository for previously uploaded files.
#[async_trait]
pub trait SentFileRepo: Send + Sync {
    /// Look up a cached upload.
    async fn get_file(
        &self,
        session_name: &str,
        md5_digest: &[u8],
        file_size: i64,
        kind: FileKind,
    ) -> StoreResult<Option<FileReference>>;

    /// Cache an upload. Re-caching the same key overwrites id and hash.
    async fn cache_file(
        &self,
        session_name: &str,
        md5_digest: &[u8],
        file_size: i64,
        reference: &FileReference,
    ) -> StoreResult<()>;

    /// Cache an upload given a raw type code.
    ///
    /// Unknown codes fail with `InvalidReference` before anything is written.
    async fn cache_file_raw(
        &self,
        session_name: &str,
        md5_digest: &[u8],
        file_size: i64,
        type_code: i32,
        id: i64,
        access_hash: i64,
    ) -> StoreResult<()> {
        let reference = FileReference::from_raw(type_code, id, access_hash)?;
        self.cache_file(session_name, md5_digest, file_size, &reference)
            .await
    }

    /// All cached uploads of a session.
    async fn list_files(&self, session_name: &str) -> StoreResult<Vec<SentFileRow>>;
}
