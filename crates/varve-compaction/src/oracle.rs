//! Transaction oracle contract.
//!
//! The oracle is the authoritative source of which start timestamps are
//! still pending. The calculator only consumes its floor; it never mutates
//! oracle state.

use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use varve_core::TxnOutcome;

/// Errors raised when the pending floor cannot be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),
}

/// Query surface of the transaction oracle.
pub trait Oracle {
    /// Minimum start timestamp among pending transactions, or 0 when none
    /// are known to be pending.
    ///
    /// Must fail rather than guess: a silent 0 would let the calculator fold
    /// away open transactions.
    fn min_pending_start_ts(&self) -> Result<u64, OracleError>;
}

impl<O: Oracle + ?Sized> Oracle for Arc<O> {
    fn min_pending_start_ts(&self) -> Result<u64, OracleError> {
        (**self).min_pending_start_ts()
    }
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn min_pending_start_ts(&self) -> Result<u64, OracleError> {
        (**self).min_pending_start_ts()
    }
}

#[derive(Debug, Default)]
struct OracleState {
    pending: BTreeSet<u64>,
    max_commit_ts: u64,
    unavailable: Option<String>,
}

/// In-memory oracle tracking pending start timestamps.
#[derive(Debug, Default)]
pub struct MemoryOracle {
    state: RwLock<OracleState>,
}

impl MemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `start_ts` as pending.
    pub fn register_start_ts(&self, start_ts: u64) {
        self.state.write().pending.insert(start_ts);
    }

    /// Resolve the transactions listed in a commit delta.
    pub fn apply_delta(&self, outcomes: &[TxnOutcome]) {
        let mut state = self.state.write();
        for outcome in outcomes {
            state.pending.remove(&outcome.start_ts);
            state.max_commit_ts = state.max_commit_ts.max(outcome.commit_ts);
        }
    }

    /// Drop a pending transaction without a commit. Returns whether it was
    /// pending.
    pub fn abort(&self, start_ts: u64) -> bool {
        self.state.write().pending.remove(&start_ts)
    }

    /// Forget every pending transaction.
    pub fn reset_txns(&self) {
        self.state.write().pending.clear();
    }

    pub fn is_pending(&self, start_ts: u64) -> bool {
        self.state.read().pending.contains(&start_ts)
    }

    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }

    /// Highest commit timestamp seen through `apply_delta`.
    pub fn max_commit_ts(&self) -> u64 {
        self.state.read().max_commit_ts
    }

    /// Make subsequent floor queries fail with `reason`, or recover with
    /// `None`.
    pub fn set_unavailable(&self, reason: Option<String>) {
        self.state.write().unavailable = reason;
    }
}

impl Oracle for MemoryOracle {
    fn min_pending_start_ts(&self) -> Result<u64, OracleError> {
        let state = self.state.read();
        if let Some(reason) = &state.unavailable {
            return Err(OracleError::Unavailable(reason.clone()));
        }
        Ok(state.pending.first().copied().unwrap_or(0))
    }
}
