//! # varve-compaction
//!
//! Log-compaction boundaries for a Raft-replicated, timestamp-ordered
//! transactional store.
//!
//! This crate provides:
//! - Oracle contract: the pending-transaction floor the calculator trusts
//! - Snapshot calculation: the highest log index safe to fold away and the
//!   read timestamp the resulting snapshot may advertise
//! - Compaction: a caller that installs calculated snapshots into a log store
//!
//! ## Architecture
//!
//! Three clocks advance independently: the applied watermark, the set of
//! pending transactions, and the commit-timestamp watermark. A snapshot is
//! produced only when:
//! 1. New entries have been applied since the last snapshot
//! 2. The window carries evidence of committed progress
//! 3. No mutation of a possibly-open transaction would be folded away
//! 4. The boundary moves strictly forward
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use varve_compaction::{MemoryOracle, SnapshotCalculator};
//! use varve_core::AppliedWatermark;
//!
//! let oracle = Arc::new(MemoryOracle::new());
//! let applied = Arc::new(AppliedWatermark::default());
//! let mut calculator = SnapshotCalculator::new(Arc::clone(&oracle), Arc::clone(&applied));
//!
//! if let Some(snapshot) = calculator.calculate_snapshot(&store, 1)? {
//!     store.create_snapshot(snapshot.index, snapshot.to_bytes()?)?;
//! }
//! ```

mod calculator;
mod compactor;
mod error;
mod oracle;
mod snapshot;

pub use calculator::{CalculatorStats, SnapshotCalculator};
pub use compactor::{
    CompactionConfig, CompactionConfigBuilder, CompactionResult, CompactionStats, Compactor,
};
pub use error::{CompactionError, Result};
pub use oracle::{MemoryOracle, Oracle, OracleError};
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};
