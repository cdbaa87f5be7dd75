//! Directory batch migration.

use crate::LEGACY_EXTENSION;
use crate::error::{MigrateError, MigrateResult};
use crate::migrate::{MigrationReport, migrate_file};
use sessionvault_store::SessionStore;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Result of importing one file during a batch.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: MigrateResult<MigrationReport>,
}

/// Per-file results of a directory migration, in path order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = (&Path, &MigrationReport)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|r| (o.path.as_path(), r)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Path, &MigrateError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.path.as_path(), e)))
    }

    /// True when at least one file failed.
    pub fn is_partial_failure(&self) -> bool {
        self.failed().next().is_some()
    }
}

/// Legacy session files directly inside `dir`, sorted by path.
async fn legacy_files(dir: &Path) -> MigrateResult<Vec<PathBuf>> {
    // A bare `.session` has no extension as far as `Path` is concerned.
    let suffix = format!(".{LEGACY_EXTENSION}");
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_legacy = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(&suffix));
        if is_legacy && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Import every legacy file in `dir`.
///
/// A failing file is recorded in the report and does not stop the batch.
/// Only a missing or non-directory `dir` fails the whole call.
pub async fn migrate_directory(store: &dyn SessionStore, dir: &Path) -> MigrateResult<BatchReport> {
    let metadata = match tokio::fs::metadata(dir).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MigrateError::SourceNotFound(dir.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_dir() {
        return Err(MigrateError::NotADirectory(dir.to_path_buf()));
    }

    let mut report = BatchReport::default();
    for path in legacy_files(dir).await? {
        let result = migrate_file(store, &path, None).await;
        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "Failed to migrate legacy session");
        }
        report.outcomes.push(FileOutcome { path, result });
    }

    info!(
        dir = %dir.display(),
        files = report.outcomes.len(),
        failed = report.failed().count(),
        "Batch migration finished"
    );
    Ok(report)
}
