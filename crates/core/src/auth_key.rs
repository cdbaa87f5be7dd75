//! Authorization key wrapper.

use std::fmt;

/// Raw authorization key bytes negotiated by the protocol client.
///
/// The store treats the key as an opaque blob. An empty key means the session
/// is not authenticated, which is how it is persisted as well.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthKey(Vec<u8>);

impl AuthKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Key bytes as stored.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert persisted bytes into a key, treating empty bytes as no key.
    pub fn from_stored(bytes: Vec<u8>) -> Option<Self> {
        if bytes.is_empty() {
            None
        } else {
            Some(Self(bytes))
        }
    }

    /// Bytes to persist for an optional key.
    pub fn to_stored(key: Option<&AuthKey>) -> Vec<u8> {
        key.map(|k| k.0.clone()).unwrap_or_default()
    }
}

// Never print key material.
impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthKey({} bytes)", self.0.len())
    }
}
