//! Uploaded file references for the content-addressed file cache.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of remote media a cached upload resolved to.
///
/// The numeric codes match the ones legacy session files persist in
/// `sent_files.type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Document,
    Photo,
}

impl FileKind {
    /// Persisted type code.
    pub fn code(self) -> i32 {
        match self {
            FileKind::Document => 0,
            FileKind::Photo => 1,
        }
    }

    /// Map a persisted type code back to a kind.
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(FileKind::Document),
            1 => Ok(FileKind::Photo),
            other => Err(Error::InvalidReference(format!(
                "unknown file type code {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Document => "document",
            FileKind::Photo => "photo",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "document" => Ok(FileKind::Document),
            "photo" => Ok(FileKind::Photo),
            other => Err(Error::InvalidReference(format!(
                "cannot cache {other} references"
            ))),
        }
    }
}

/// A remote file the server already holds: its id and access hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileReference {
    pub kind: FileKind,
    pub id: i64,
    pub access_hash: i64,
}

impl FileReference {
    pub fn document(id: i64, access_hash: i64) -> Self {
        Self {
            kind: FileKind::Document,
            id,
            access_hash,
        }
    }

    pub fn photo(id: i64, access_hash: i64) -> Self {
        Self {
            kind: FileKind::Photo,
            id,
            access_hash,
        }
    }

    /// Build a reference from a raw type code, rejecting unknown kinds.
    pub fn from_raw(code: i32, id: i64, access_hash: i64) -> Result<Self> {
        Ok(Self {
            kind: FileKind::from_code(code)?,
            id,
            access_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_legacy_layout() {
        assert_eq!(FileKind::Document.code(), 0);
        assert_eq!(FileKind::Photo.code(), 1);
        assert_eq!(FileKind::from_code(1).unwrap(), FileKind::Photo);
    }

    #[test]
    fn test_unknown_code_is_invalid_reference() {
        let err = FileReference::from_raw(7, 1, 2).unwrap_err();
        assert!(matches!(err, Error::InvalidReference(_)));
    }

    #[test]
    fn test_parse_kind_names() {
        assert_eq!("document".parse::<FileKind>().unwrap(), FileKind::Document);
        assert!("sticker".parse::<FileKind>().is_err());
    }
}
