//! Update delivery cursors.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Position markers for one update source.
///
/// The store keeps these values verbatim; their meaning belongs to the
/// protocol client's update loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCursor {
    /// Primary position.
    pub pts: i32,
    /// Secondary position.
    pub qts: i32,
    /// Timestamp of the last applied update, second precision.
    #[serde(with = "time::serde::timestamp::option")]
    pub date: Option<OffsetDateTime>,
    /// Sequence number.
    pub seq: i32,
}

impl UpdateCursor {
    pub fn new(pts: i32, qts: i32, date: Option<OffsetDateTime>, seq: i32) -> Self {
        Self {
            pts,
            qts,
            date,
            seq,
        }
    }

    /// Build a cursor from persisted column values.
    ///
    /// Timestamps outside the representable range are dropped.
    pub fn from_columns(pts: i32, qts: i32, date: Option<i64>, seq: i32) -> Self {
        let date = date.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());
        Self::new(pts, qts, date, seq)
    }

    /// Timestamp as unix seconds, the form it is persisted in.
    pub fn date_unix(&self) -> Option<i64> {
        self.date.map(OffsetDateTime::unix_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_round_trip_keeps_seconds() {
        let cursor = UpdateCursor::from_columns(100, 50, Some(1_700_000_000), 7);
        assert_eq!(cursor.date_unix(), Some(1_700_000_000));
        assert_eq!(cursor.pts, 100);
        assert_eq!(cursor.qts, 50);
        assert_eq!(cursor.seq, 7);
    }

    #[test]
    fn test_missing_date_stays_missing() {
        let cursor = UpdateCursor::from_columns(1, 2, None, 3);
        assert!(cursor.date.is_none());
        assert!(cursor.date_unix().is_none());
    }

    #[test]
    fn test_out_of_range_date_is_dropped() {
        let cursor = UpdateCursor::from_columns(1, 2, Some(i64::MAX), 3);
        assert!(cursor.date.is_none());
    }
}
