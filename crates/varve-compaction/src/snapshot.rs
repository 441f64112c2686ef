//! Snapshot descriptors.
//!
//! A snapshot here is a compaction boundary, not a state dump: everything at
//! or below `index` may be folded away, and readers of the snapshot may see
//! fully committed state up to `read_ts`.

use crate::error::{CompactionError, Result};
use serde::{Deserialize, Serialize};
use varve_store::SnapshotMeta;

/// Current snapshot payload format version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// A compaction boundary produced by the calculator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snapshot {
    /// Highest log index whose effects are captured.
    pub index: u64,

    /// Timestamp up to which snapshot readers see committed state.
    pub read_ts: u64,
}

/// On-disk form stored as the log store's snapshot payload.
#[derive(Serialize, Deserialize)]
struct SnapshotRecord {
    version: u8,
    index: u64,
    read_ts: u64,
}

impl Snapshot {
    pub fn new(index: u64, read_ts: u64) -> Self {
        Snapshot { index, read_ts }
    }

    /// Serialize for installation as a snapshot payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let record = SnapshotRecord {
            version: SNAPSHOT_VERSION,
            index: self.index,
            read_ts: self.read_ts,
        };
        serde_json::to_vec(&record).map_err(|e| CompactionError::Serialization(e.to_string()))
    }

    /// Deserialize a snapshot payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let record: SnapshotRecord = serde_json::from_slice(data)
            .map_err(|e| CompactionError::Serialization(e.to_string()))?;

        if record.version != SNAPSHOT_VERSION {
            return Err(CompactionError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                actual: record.version,
            });
        }

        Ok(Snapshot {
            index: record.index,
            read_ts: record.read_ts,
        })
    }

    /// Recover the descriptor behind an installed snapshot.
    ///
    /// Returns `None` for a fresh store. A snapshot installed without a
    /// payload (e.g. received from a peer) is taken at its index with no
    /// known read timestamp.
    pub fn from_meta(meta: &SnapshotMeta) -> Result<Option<Self>> {
        if meta.is_empty() {
            return Ok(None);
        }
        if meta.data.is_empty() {
            return Ok(Some(Snapshot::new(meta.index, 0)));
        }

        let snapshot = Self::from_bytes(&meta.data)?;
        if snapshot.index != meta.index {
            return Err(CompactionError::Serialization(format!(
                "payload index {} does not match installed index {}",
                snapshot.index, meta.index
            )));
        }
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip() {
        let snapshot = Snapshot::new(8, 9);
        let data = snapshot.to_bytes().unwrap();

        assert_eq!(Snapshot::from_bytes(&data).unwrap(), snapshot);
    }

    #[test]
    fn test_version_mismatch() {
        let data = br#"{"version":2,"index":1,"read_ts":5}"#;

        assert_eq!(
            Snapshot::from_bytes(data),
            Err(CompactionError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                actual: 2
            })
        );
    }

    #[test]
    fn test_from_meta() {
        assert_eq!(Snapshot::from_meta(&SnapshotMeta::default()).unwrap(), None);

        let bare = SnapshotMeta::new(4, 1, Vec::new());
        assert_eq!(Snapshot::from_meta(&bare).unwrap(), Some(Snapshot::new(4, 0)));

        let full = SnapshotMeta::new(4, 1, Snapshot::new(4, 11).to_bytes().unwrap());
        assert_eq!(Snapshot::from_meta(&full).unwrap(), Some(Snapshot::new(4, 11)));

        let mismatched = SnapshotMeta::new(5, 1, Snapshot::new(4, 11).to_bytes().unwrap());
        assert!(matches!(
            Snapshot::from_meta(&mismatched),
            Err(CompactionError::Serialization(_))
        ));
    }
}
