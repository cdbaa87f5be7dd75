//! Session store error types.

use thiserror::Error;

/// Session store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The relational store failed, timed out or could not be bootstrapped.
    /// Nothing from the failed operation was committed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("invalid file reference: {0}")]
    InvalidReference(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The database exists but its layout is not one this store can use.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether the failure came from the underlying connection.
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, StoreError::StorageUnavailable(_))
    }
}

impl From<sessionvault_core::Error> for StoreError {
    fn from(e: sessionvault_core::Error) -> Self {
        match e {
            sessionvault_core::Error::InvalidReference(msg) => StoreError::InvalidReference(msg),
            sessionvault_core::Error::InvalidConfig(msg) => StoreError::Config(msg),
        }
    }
}

/// Filesystem failures while preparing the database location.
impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::StorageUnavailable(sqlx::Error::Io(e))
    }
}

/// Result type for session store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_store_variants() {
        let err: StoreError = sessionvault_core::Error::InvalidReference("x".to_string()).into();
        assert!(matches!(err, StoreError::InvalidReference(_)));
        let err: StoreError = sessionvault_core::Error::InvalidConfig("y".to_string()).into();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_pool_timeout_is_storage_unavailable() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_storage_unavailable());
        assert!(err.to_string().starts_with("storage unavailable"));
    }

    #[test]
    fn test_io_errors_are_storage_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only mount");
        let err: StoreError = io.into();
        assert!(err.is_storage_unavailable());
        assert!(err.to_string().contains("read-only mount"));
    }
}
