//! In-memory log store.

use crate::store::{LogStore, SnapshotMeta, StoreError};
use varve_core::{HardState, LogEntry};

/// In-memory implementation of [`LogStore`].
///
/// Retained entries are kept contiguous, starting right after the installed
/// snapshot's index.
#[derive(Clone, Debug, Default)]
pub struct MemoryLogStore {
    /// Last saved hard state.
    hard_state: HardState,

    /// Installed snapshot (index 0 for a fresh store).
    snapshot: SnapshotMeta,

    /// Entries `snapshot.index + 1 ..= last_index`.
    entries: Vec<LogEntry>,
}

impl MemoryLogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `entries`.
    pub fn with_entries(entries: &[LogEntry]) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.append(entries)?;
        Ok(store)
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn first(&self) -> u64 {
        self.snapshot.index + 1
    }

    fn last(&self) -> u64 {
        self.snapshot.index + self.entries.len() as u64
    }

    /// Replace the whole log with a snapshot received from a leader.
    fn apply_snapshot(&mut self, snapshot: &SnapshotMeta) -> Result<(), StoreError> {
        if snapshot.index <= self.snapshot.index {
            return Err(StoreError::SnapshotOutOfDate {
                index: snapshot.index,
                current: self.snapshot.index,
            });
        }

        self.snapshot = snapshot.clone();
        self.entries.clear();
        Ok(())
    }

    /// Append entries, overwriting any conflicting suffix.
    fn append(&mut self, entries: &[LogEntry]) -> Result<(), StoreError> {
        for pair in entries.windows(2) {
            if pair[1].index != pair[0].index + 1 {
                return Err(StoreError::NonContiguous {
                    after: pair[0].index,
                    got: pair[1].index,
                });
            }
        }

        // Drop the part already folded into the snapshot.
        let first = self.first();
        let entries: Vec<&LogEntry> = entries.iter().filter(|e| e.index >= first).collect();
        let Some(head) = entries.first() else {
            return Ok(());
        };

        let next = self.last() + 1;
        if head.index > next {
            return Err(StoreError::Gap {
                expected: next,
                got: head.index,
            });
        }

        self.entries.truncate((head.index - first) as usize);
        self.entries.extend(entries.into_iter().cloned());
        Ok(())
    }
}

impl LogStore for MemoryLogStore {
    fn first_index(&self) -> Result<u64, StoreError> {
        Ok(self.first())
    }

    fn last_index(&self) -> Result<u64, StoreError> {
        Ok(self.last())
    }

    fn term(&self, index: u64) -> Result<u64, StoreError> {
        if index == self.snapshot.index {
            return Ok(self.snapshot.term);
        }
        if index < self.snapshot.index {
            return Err(StoreError::Compacted {
                index,
                first: self.first(),
            });
        }
        if index > self.last() {
            return Err(StoreError::Unavailable {
                index,
                last: self.last(),
            });
        }

        Ok(self.entries[(index - self.first()) as usize].term)
    }

    fn entries(&self, lo: u64, hi: u64) -> Result<Vec<LogEntry>, StoreError> {
        if lo <= self.snapshot.index {
            return Err(StoreError::Compacted {
                index: lo,
                first: self.first(),
            });
        }
        if hi > self.last() {
            return Err(StoreError::Unavailable {
                index: hi,
                last: self.last(),
            });
        }
        if lo > hi {
            return Ok(Vec::new());
        }

        let first = self.first();
        Ok(self.entries[(lo - first) as usize..=(hi - first) as usize].to_vec())
    }

    fn hard_state(&self) -> Result<HardState, StoreError> {
        Ok(self.hard_state)
    }

    fn snapshot(&self) -> Result<SnapshotMeta, StoreError> {
        Ok(self.snapshot.clone())
    }

    fn save(
        &mut self,
        hard_state: &HardState,
        entries: &[LogEntry],
        snapshot: Option<&SnapshotMeta>,
    ) -> Result<(), StoreError> {
        if let Some(snapshot) = snapshot.filter(|s| !s.is_empty()) {
            self.apply_snapshot(snapshot)?;
        }
        self.append(entries)?;
        if !hard_state.is_empty() {
            self.hard_state = *hard_state;
        }
        Ok(())
    }

    fn create_snapshot(&mut self, index: u64, data: Vec<u8>) -> Result<SnapshotMeta, StoreError> {
        if index <= self.snapshot.index {
            return Err(StoreError::SnapshotOutOfDate {
                index,
                current: self.snapshot.index,
            });
        }
        if index > self.last() {
            return Err(StoreError::Unavailable {
                index,
                last: self.last(),
            });
        }

        let term = self.term(index)?;
        let folded = (index - self.snapshot.index) as usize;
        self.entries.drain(..folded);
        self.snapshot = SnapshotMeta::new(index, term, data);

        Ok(self.snapshot.clone())
    }
}
