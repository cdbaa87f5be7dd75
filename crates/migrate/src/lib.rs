//! Import of legacy single-file session databases.
//!
//! A legacy source holds exactly one session in four tables (`sessions`,
//! `entities`, `update_state`, `sent_files`). Importing replays each table
//! into a shared [`SessionStore`](sessionvault_store::SessionStore) through
//! its public write paths.

pub mod batch;
pub mod error;
pub mod legacy;
pub mod migrate;

pub use batch::{BatchReport, FileOutcome, migrate_directory};
pub use error::{MigrateError, MigrateResult};
pub use legacy::{LegacySnapshot, LegacySource};
pub use migrate::{MigrationReport, derive_session_name, migrate_file};

/// File extension of legacy session databases.
pub const LEGACY_EXTENSION: &str = "session";
