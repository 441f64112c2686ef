//! # varve-store
//!
//! The Raft log store contract consumed by Varve's compaction pipeline.
//!
//! A [`LogStore`] is a durable, append-only sequence of entries with
//! index/term metadata. It supports inclusive range reads, truncating
//! writes, and snapshot installation. Installing a snapshot at index `i`
//! folds every entry `<= i` away; afterwards `first_index() == i + 1`.
//!
//! [`MemoryLogStore`] is an in-memory implementation with the same
//! truncation semantics, used by tests and the replica simulation.

mod memory;
mod store;

pub use memory::MemoryLogStore;
pub use store::{LogStore, SnapshotMeta, StoreError};
