//! # varve-core
//!
//! Shared building blocks for the Varve log-compaction pipeline.
//!
//! This crate provides:
//! - Log entries: the Raft entry shape the rest of the workspace consumes
//! - Proposal codec: typed decoding of entry payloads into mutations and
//!   commit deltas
//! - Applied watermark: a monotonic "done-until" marker that tolerates
//!   out-of-order completion reports from concurrent apply workers
//!
//! ## Example
//!
//! ```rust,ignore
//! use varve_core::{AppliedWatermark, LogEntry, Proposal};
//!
//! let entry = LogEntry::mutation(1, 1, 10)?;
//! assert_eq!(Proposal::decode(&entry.payload)?, Proposal::Mutation { start_ts: 10 });
//!
//! let applied = AppliedWatermark::new(0);
//! applied.mark_done(2);
//! assert_eq!(applied.done_until(), 0); // index 1 still outstanding
//! applied.mark_done(1);
//! assert_eq!(applied.done_until(), 2);
//! ```

mod entry;
mod proposal;
mod watermark;

pub use entry::{EntryKind, HardState, LogEntry};
pub use proposal::{CodecError, Proposal, TxnOutcome};
pub use watermark::AppliedWatermark;
