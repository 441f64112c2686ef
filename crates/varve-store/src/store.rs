//! Log store trait and shared types.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use varve_core::{HardState, LogEntry};

/// Errors raised by log store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Index {index} has been compacted (first retained index is {first})")]
    Compacted { index: u64, first: u64 },

    #[error("Index {index} is unavailable (last index is {last})")]
    Unavailable { index: u64, last: u64 },

    #[error("Snapshot at {index} is out of date (current snapshot is at {current})")]
    SnapshotOutOfDate { index: u64, current: u64 },

    #[error("Entries leave a gap: expected index {expected}, got {got}")]
    Gap { expected: u64, got: u64 },

    #[error("Entries are not contiguous: {got} follows {after}")]
    NonContiguous { after: u64, got: u64 },

    #[error("Storage I/O error: {0}")]
    Io(String),
}

/// Metadata of the snapshot currently installed in a log store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Highest index folded into the snapshot.
    pub index: u64,

    /// Term of the entry at `index`.
    pub term: u64,

    /// Opaque snapshot payload supplied by the installer.
    pub data: Vec<u8>,
}

impl SnapshotMeta {
    pub fn new(index: u64, term: u64, data: Vec<u8>) -> Self {
        SnapshotMeta { index, term, data }
    }

    /// The zero snapshot installed in a fresh store.
    pub fn is_empty(&self) -> bool {
        self.index == 0
    }
}

/// Durable Raft log storage.
///
/// Implementations are append-only except for the suffix truncation implied
/// by overwriting conflicting entries and the prefix truncation implied by
/// installing a snapshot.
pub trait LogStore {
    /// Index of the first retained entry.
    fn first_index(&self) -> Result<u64, StoreError>;

    /// Index of the last retained entry (the snapshot index if none remain).
    fn last_index(&self) -> Result<u64, StoreError>;

    /// Term of the entry at `index`. The snapshot index is always answerable.
    fn term(&self, index: u64) -> Result<u64, StoreError>;

    /// Entries in the inclusive range `[lo, hi]`, in increasing index order.
    fn entries(&self, lo: u64, hi: u64) -> Result<Vec<LogEntry>, StoreError>;

    /// Last saved hard state.
    fn hard_state(&self) -> Result<HardState, StoreError>;

    /// Currently installed snapshot.
    fn snapshot(&self) -> Result<SnapshotMeta, StoreError>;

    /// Durably persist a hard state, entries and optionally a received
    /// snapshot. An empty hard state is not written.
    fn save(
        &mut self,
        hard_state: &HardState,
        entries: &[LogEntry],
        snapshot: Option<&SnapshotMeta>,
    ) -> Result<(), StoreError>;

    /// Install a snapshot at `index`, discarding every entry `<= index`.
    fn create_snapshot(&mut self, index: u64, data: Vec<u8>) -> Result<SnapshotMeta, StoreError>;

    /// Whether any entries are retained.
    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.last_index()? < self.first_index()?)
    }
}
