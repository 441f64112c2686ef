//! Snapshot boundary calculation.
//!
//! The calculator reads the log window between the store's first retained
//! index and the applied watermark, decodes each normal entry, and walks the
//! decoded proposals once, front to back. The walk stops at the first
//! mutation whose transaction may still be open; everything before it is
//! safe to fold away. Stopping early can leave slack when a later entry in
//! the same window resolves the blocking transaction; the walk never looks
//! ahead to recover it.

use crate::error::Result;
use crate::oracle::Oracle;
use crate::snapshot::Snapshot;
use std::sync::Arc;
use tracing::{debug, info, warn};
use varve_core::{AppliedWatermark, LogEntry, Proposal};
use varve_store::LogStore;

/// Counters describing calculator activity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CalculatorStats {
    /// Total invocations of `calculate_snapshot`.
    pub calculations: u64,

    /// Invocations that produced a snapshot.
    pub snapshots_produced: u64,

    /// Normal entries skipped because their payload did not decode.
    pub undecodable_entries: u64,

    /// Scans halted by a possibly-open transaction.
    pub pending_halts: u64,

    /// Index of the mutation that halted the most recent halted scan.
    pub last_halt_index: Option<u64>,
}

/// Result of walking one window of decoded proposals.
#[derive(Debug, PartialEq, Eq)]
struct Scan {
    /// Last index deemed safe to fold away.
    boundary: Option<u64>,

    /// Mutation that halted the walk, if any.
    halted_at: Option<u64>,

    /// Highest commit timestamp in the window, if it holds any commit delta.
    max_commit_ts: Option<u64>,
}

/// Computes the highest log index safe to snapshot and the read timestamp
/// that snapshot may expose.
///
/// Invocations must be sequential per replica: the calculator remembers the
/// last snapshot it produced to guarantee forward progress.
pub struct SnapshotCalculator<O> {
    /// Source of the pending-transaction floor.
    oracle: O,

    /// Applied watermark shared with the apply pipeline.
    applied: Arc<AppliedWatermark>,

    /// Last snapshot produced (or resumed from).
    last: Option<Snapshot>,

    stats: CalculatorStats,
}

impl<O: Oracle> SnapshotCalculator<O> {
    /// Create a calculator over an injected oracle and applied watermark.
    pub fn new(oracle: O, applied: Arc<AppliedWatermark>) -> Self {
        SnapshotCalculator {
            oracle,
            applied,
            last: None,
            stats: CalculatorStats::default(),
        }
    }

    /// Seed the forward-progress state from an installed snapshot.
    pub fn resume_from(&mut self, snapshot: Snapshot) {
        let newer = self.last.map_or(true, |last| snapshot.index > last.index);
        if newer {
            let read_ts = self.last.map_or(0, |last| last.read_ts).max(snapshot.read_ts);
            self.last = Some(Snapshot::new(snapshot.index, read_ts));
        }
    }

    /// Last snapshot produced by this calculator.
    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.last
    }

    pub fn applied(&self) -> &Arc<AppliedWatermark> {
        &self.applied
    }

    pub fn stats(&self) -> &CalculatorStats {
        &self.stats
    }

    /// Compute the next snapshot boundary, or `None` when there is no safe
    /// forward progress to make.
    ///
    /// `cadence_hint` is the minimum span `until - first` of applied entries
    /// required before a window is considered at all. It only controls how
    /// eagerly snapshots are taken; safety never depends on it.
    ///
    /// Store read failures and oracle failures abort the invocation.
    pub fn calculate_snapshot<S: LogStore + ?Sized>(
        &mut self,
        store: &S,
        cadence_hint: u64,
    ) -> Result<Option<Snapshot>> {
        self.stats.calculations += 1;

        let first = store.first_index()?;
        let until = self.applied.done_until();
        if until < first {
            debug!(first, until, "nothing applied since last snapshot");
            return Ok(None);
        }
        if until - first < cadence_hint {
            debug!(first, until, cadence_hint, "applied window below cadence");
            return Ok(None);
        }

        let entries = store.entries(first, until)?;
        let min_pending = self.oracle.min_pending_start_ts()?;
        let proposals = self.decode_window(&entries);

        let scan = scan(&proposals, min_pending, until);
        if let Some(halted_at) = scan.halted_at {
            self.stats.pending_halts += 1;
            self.stats.last_halt_index = Some(halted_at);
            debug!(halted_at, min_pending, "scan halted on pending transaction");
        }

        let Some(max_commit_ts) = scan.max_commit_ts else {
            debug!(first, until, "no commit evidence in window");
            return Ok(None);
        };
        let Some(boundary) = scan.boundary else {
            debug!(first, until, "first entry of window is pending");
            return Ok(None);
        };

        let (last_index, last_read_ts) = self.last.map_or((0, 0), |s| (s.index, s.read_ts));
        if boundary <= last_index {
            debug!(boundary, last_index, "no forward progress");
            return Ok(None);
        }

        let snapshot = Snapshot::new(boundary, max_commit_ts.max(last_read_ts));
        self.last = Some(snapshot);
        self.stats.snapshots_produced += 1;
        info!(
            index = snapshot.index,
            read_ts = snapshot.read_ts,
            first,
            until,
            "calculated snapshot"
        );

        Ok(Some(snapshot))
    }

    /// Decode normal entries, skipping (and counting) undecodable ones.
    fn decode_window(&mut self, entries: &[LogEntry]) -> Vec<(u64, Proposal)> {
        let mut proposals = Vec::with_capacity(entries.len());

        for entry in entries {
            match entry.proposal() {
                None => {}
                Some(Ok(proposal)) => proposals.push((entry.index, proposal)),
                Some(Err(e)) => {
                    self.stats.undecodable_entries += 1;
                    warn!(index = entry.index, error = %e, "skipping undecodable proposal");
                }
            }
        }

        proposals
    }
}

/// Walk decoded proposals once.
///
/// The boundary walk halts at the first mutation with
/// `start_ts >= min_pending > 0`. Commit evidence is gathered over the whole
/// window, since commits never block and the read timestamp covers every
/// applied outcome.
fn scan(proposals: &[(u64, Proposal)], min_pending: u64, until: u64) -> Scan {
    let blocks = |start_ts: u64| min_pending != 0 && start_ts >= min_pending;

    let mut boundary = None;
    let mut halted_at = None;
    for (index, proposal) in proposals {
        if let Proposal::Mutation { start_ts } = proposal {
            if blocks(*start_ts) {
                halted_at = Some(*index);
                break;
            }
        }
        boundary = Some(*index);
    }
    if halted_at.is_none() {
        boundary = Some(until);
    }

    let max_commit_ts = proposals
        .iter()
        .filter_map(|(_, proposal)| proposal.max_commit_ts())
        .max();

    Scan {
        boundary,
        halted_at,
        max_commit_ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompactionError;
    use crate::oracle::{MemoryOracle, OracleError};
    use varve_core::{HardState, TxnOutcome};
    use varve_store::{MemoryLogStore, StoreError};

    fn mutation(index: u64, start_ts: u64) -> LogEntry {
        LogEntry::mutation(index, 1, start_ts).unwrap()
    }

    fn commit(index: u64, start_ts: u64, commit_ts: u64) -> LogEntry {
        LogEntry::commit(index, 1, [TxnOutcome::committed(start_ts, commit_ts)]).unwrap()
    }

    fn setup(
        entries: &[LogEntry],
    ) -> (
        MemoryLogStore,
        Arc<MemoryOracle>,
        SnapshotCalculator<Arc<MemoryOracle>>,
    ) {
        let store = MemoryLogStore::with_entries(entries).unwrap();
        let oracle = Arc::new(MemoryOracle::new());
        let applied = Arc::new(AppliedWatermark::default());
        applied.set_done_until(entries.last().map_or(0, |e| e.index));
        let calculator = SnapshotCalculator::new(Arc::clone(&oracle), applied);
        (store, oracle, calculator)
    }

    #[test]
    fn test_scan_halts_without_lookahead() {
        let proposals = vec![
            (1, Proposal::Mutation { start_ts: 1 }),
            (2, Proposal::Mutation { start_ts: 5 }),
            (3, Proposal::Mutation { start_ts: 2 }),
            (
                4,
                Proposal::CommitDelta {
                    outcomes: vec![TxnOutcome::committed(5, 6)],
                },
            ),
        ];

        let result = scan(&proposals, 5, 4);
        assert_eq!(
            result,
            Scan {
                boundary: Some(1),
                halted_at: Some(2),
                max_commit_ts: Some(6),
            }
        );
    }

    #[test]
    fn test_scan_without_pending_reaches_until() {
        let proposals = vec![
            (3, Proposal::Mutation { start_ts: 9 }),
            (
                4,
                Proposal::CommitDelta {
                    outcomes: vec![TxnOutcome::committed(9, 10)],
                },
            ),
        ];

        let result = scan(&proposals, 0, 6);
        assert_eq!(result.boundary, Some(6));
        assert_eq!(result.halted_at, None);
    }

    #[test]
    fn test_pending_first_entry_yields_none() {
        let (store, oracle, mut calculator) = setup(&[mutation(1, 4), commit(2, 1, 3)]);
        oracle.register_start_ts(4);

        assert_eq!(calculator.calculate_snapshot(&store, 0).unwrap(), None);
        assert_eq!(calculator.stats().pending_halts, 1);
        assert_eq!(calculator.stats().last_halt_index, Some(1));
    }

    #[test]
    fn test_mutations_without_commit_yield_none() {
        let (store, _oracle, mut calculator) = setup(&[mutation(1, 1), mutation(2, 2)]);

        assert_eq!(calculator.calculate_snapshot(&store, 0).unwrap(), None);
        assert_eq!(calculator.last_snapshot(), None);
    }

    #[test]
    fn test_commit_only_window() {
        let (store, _oracle, mut calculator) = setup(&[commit(1, 1, 2), commit(2, 3, 4)]);

        assert_eq!(
            calculator.calculate_snapshot(&store, 0).unwrap(),
            Some(Snapshot::new(2, 4))
        );
    }

    #[test]
    fn test_undecodable_entries_are_skipped() {
        let entries = vec![
            mutation(1, 1),
            LogEntry::new(2, 1, b"\xffgarbage".to_vec()),
            commit(3, 1, 2),
        ];
        let (store, _oracle, mut calculator) = setup(&entries);

        assert_eq!(
            calculator.calculate_snapshot(&store, 0).unwrap(),
            Some(Snapshot::new(3, 2))
        );
        assert_eq!(calculator.stats().undecodable_entries, 1);
    }

    #[test]
    fn test_other_entries_are_ignored() {
        let entries = vec![
            LogEntry::other(1, 1, b"add-node".to_vec()),
            commit(2, 1, 2),
        ];
        let (store, _oracle, mut calculator) = setup(&entries);

        assert_eq!(
            calculator.calculate_snapshot(&store, 0).unwrap(),
            Some(Snapshot::new(2, 2))
        );
        assert_eq!(calculator.stats().undecodable_entries, 0);
    }

    #[test]
    fn test_cadence_gate() {
        let (store, _oracle, mut calculator) = setup(&[mutation(1, 1), commit(2, 1, 2)]);

        // until - first == 1
        assert_eq!(calculator.calculate_snapshot(&store, 2).unwrap(), None);
        assert!(calculator.calculate_snapshot(&store, 1).unwrap().is_some());
    }

    #[test]
    fn test_no_progress_is_idempotent() {
        let (store, _oracle, mut calculator) = setup(&[mutation(1, 1), commit(2, 1, 2)]);

        assert!(calculator.calculate_snapshot(&store, 0).unwrap().is_some());
        assert_eq!(calculator.calculate_snapshot(&store, 0).unwrap(), None);
        assert_eq!(calculator.stats().snapshots_produced, 1);
        assert_eq!(calculator.stats().calculations, 2);
    }

    #[test]
    fn test_read_ts_never_regresses() {
        let (mut store, _oracle, mut calculator) = setup(&[mutation(1, 1), commit(2, 1, 20)]);
        assert_eq!(
            calculator.calculate_snapshot(&store, 0).unwrap(),
            Some(Snapshot::new(2, 20))
        );
        store.create_snapshot(2, Vec::new()).unwrap();

        // An aborted txn carries no commit timestamp
        let abort = LogEntry::commit(3, 1, [TxnOutcome::aborted(21)]).unwrap();
        store.save(&HardState::default(), &[abort], None).unwrap();
        calculator.applied().mark_done(3);

        assert_eq!(
            calculator.calculate_snapshot(&store, 0).unwrap(),
            Some(Snapshot::new(3, 20))
        );
    }

    #[test]
    fn test_resume_from_installed_snapshot() {
        let (store, _oracle, mut calculator) = setup(&[mutation(1, 1), commit(2, 1, 2)]);
        calculator.resume_from(Snapshot::new(2, 30));

        assert_eq!(calculator.calculate_snapshot(&store, 0).unwrap(), None);
        assert_eq!(calculator.last_snapshot(), Some(Snapshot::new(2, 30)));

        // Older snapshots are ignored
        calculator.resume_from(Snapshot::new(1, 40));
        assert_eq!(calculator.last_snapshot(), Some(Snapshot::new(2, 30)));
    }

    #[test]
    fn test_oracle_failure_aborts() {
        let (store, oracle, mut calculator) = setup(&[mutation(1, 1), commit(2, 1, 2)]);
        oracle.set_unavailable(Some("down".to_string()));

        assert_eq!(
            calculator.calculate_snapshot(&store, 0),
            Err(CompactionError::Oracle(OracleError::Unavailable(
                "down".to_string()
            )))
        );
        assert_eq!(calculator.last_snapshot(), None);
    }

    #[test]
    fn test_store_failure_aborts() {
        let (store, _oracle, mut calculator) = setup(&[mutation(1, 1), commit(2, 1, 2)]);
        // Watermark past the retained log
        calculator.applied().set_done_until(5);

        assert_eq!(
            calculator.calculate_snapshot(&store, 0),
            Err(CompactionError::Store(StoreError::Unavailable {
                index: 5,
                last: 2
            }))
        );
        assert_eq!(calculator.last_snapshot(), None);
    }
}
