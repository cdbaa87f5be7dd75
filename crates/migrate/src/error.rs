//! Migration error types.

use sessionvault_store::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while importing a legacy session file.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("legacy source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The legacy file could not be opened or read.
    #[error("legacy source unreadable: {0}")]
    Legacy(sqlx::Error),

    #[error("invalid legacy data: {0}")]
    InvalidLegacyData(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MigrateError {
    pub fn is_source_not_found(&self) -> bool {
        matches!(self, MigrateError::SourceNotFound(_))
    }
}

/// Result type for migration operations.
pub type MigrateResult<T> = std::result::Result<T, MigrateError>;
