//! Peer identifiers and cached entity records.

use serde::{Deserialize, Serialize};

/// Offset the protocol adds to channel ids when marking them.
pub const CHANNEL_MARK_OFFSET: i64 = 1_000_000_000_000;

/// The three kinds of peer a bare numeric id can refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    User,
    Chat,
    Channel,
}

impl PeerKind {
    pub const ALL: [PeerKind; 3] = [PeerKind::User, PeerKind::Chat, PeerKind::Channel];

    /// Encode a bare id the way the protocol client marks it for this kind.
    ///
    /// Users keep their id, chats are negated and channels are negated after
    /// adding [`CHANNEL_MARK_OFFSET`]. Returns `None` on overflow.
    pub fn marked_id(self, bare_id: i64) -> Option<i64> {
        match self {
            PeerKind::User => Some(bare_id),
            PeerKind::Chat => bare_id.checked_neg(),
            PeerKind::Channel => CHANNEL_MARK_OFFSET
                .checked_add(bare_id)
                .and_then(i64::checked_neg),
        }
    }

    /// Split a marked id back into its kind and bare id.
    pub fn resolve(marked_id: i64) -> (PeerKind, i64) {
        if marked_id >= 0 {
            (PeerKind::User, marked_id)
        } else if marked_id <= -CHANNEL_MARK_OFFSET {
            (PeerKind::Channel, -marked_id - CHANNEL_MARK_OFFSET)
        } else {
            (PeerKind::Chat, -marked_id)
        }
    }

    /// Every marked id a bare id may have been stored under.
    pub fn marked_candidates(bare_id: i64) -> Vec<i64> {
        let mut ids: Vec<i64> = Self::ALL
            .iter()
            .filter_map(|kind| kind.marked_id(bare_id))
            .collect();
        ids.dedup();
        ids
    }
}

/// Lookup keys the protocol client reports for one peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Marked peer id.
    pub id: i64,
    /// Access hash required to address the peer.
    pub hash: i64,
    pub username: Option<String>,
    pub phone: Option<String>,
    /// Display name.
    pub name: Option<String>,
}

impl PeerEntry {
    pub fn new(id: i64, hash: i64) -> Self {
        Self {
            id,
            hash,
            username: None,
            phone: None,
            name: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Username in the case-folded form it is stored and matched under.
    pub fn normalized_username(&self) -> Option<String> {
        normalize_username(self.username.as_deref())
    }
}

/// Case-fold a username, mapping empty values to `None`.
pub fn normalize_username(username: Option<&str>) -> Option<String> {
    username
        .filter(|u| !u.is_empty())
        .map(|u| u.to_lowercase())
}

/// The id and access hash pair a lookup resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: i64,
    pub hash: i64,
}

impl From<(i64, i64)> for EntityRef {
    fn from((id, hash): (i64, i64)) -> Self {
        Self { id, hash }
    }
}
