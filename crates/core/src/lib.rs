//! Core value types shared by the sessionvault crates.
//!
//! The protocol client owns the real definitions of these values. This crate
//! keeps only the fields the session store persists:
//! - Authorization key bytes
//! - Peer identifiers and their marked encodings
//! - Cached entity lookup keys
//! - Update delivery cursors
//! - Uploaded file references
//! - Store connection configuration

pub mod auth_key;
pub mod config;
pub mod error;
pub mod file;
pub mod peer;
pub mod update;

pub use auth_key::AuthKey;
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use file::{FileKind, FileReference};
pub use peer::{EntityRef, PeerEntry, PeerKind, normalize_username};
pub use update::UpdateCursor;

/// Version marker written to the `version` table of a bootstrapped store.
pub const DATABASE_VERSION: i32 = 1;

/// Session name used when none can be derived from a legacy file name.
pub const DEFAULT_SESSION_NAME: &str = "default";
