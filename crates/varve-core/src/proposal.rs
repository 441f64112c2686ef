//! Proposal codec.
//!
//! Normal log entries carry a JSON-encoded [`Proposal`]: either the start of
//! a transaction or a batch of transaction outcomes. Decoding is pure and
//! deterministic; a payload that fails to decode is reported as a
//! [`CodecError`] which callers scanning the log treat as "no proposal".

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while encoding or decoding proposal payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty proposal payload")]
    Empty,

    #[error("Malformed proposal payload: {0}")]
    Malformed(String),

    #[error("Commit timestamp {commit_ts} precedes start timestamp {start_ts}")]
    CommitBeforeStart { start_ts: u64, commit_ts: u64 },

    #[error("Proposal encoding failed: {0}")]
    Encode(String),
}

/// Outcome of a single transaction inside a commit delta.
///
/// A `commit_ts` of zero records an abort.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxnOutcome {
    pub start_ts: u64,
    pub commit_ts: u64,
}

impl TxnOutcome {
    pub fn committed(start_ts: u64, commit_ts: u64) -> Self {
        TxnOutcome {
            start_ts,
            commit_ts,
        }
    }

    pub fn aborted(start_ts: u64) -> Self {
        TxnOutcome {
            start_ts,
            commit_ts: 0,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.commit_ts == 0
    }
}

/// A typed proposal decoded from a normal entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Proposal {
    /// Opens or continues the transaction identified by `start_ts`.
    Mutation { start_ts: u64 },

    /// Finalizes one or more transactions.
    CommitDelta { outcomes: Vec<TxnOutcome> },
}

impl Proposal {
    /// Decode a payload into a proposal.
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        if payload.is_empty() {
            return Err(CodecError::Empty);
        }

        let proposal: Proposal =
            serde_json::from_slice(payload).map_err(|e| CodecError::Malformed(e.to_string()))?;

        if let Proposal::CommitDelta { outcomes } = &proposal {
            if let Some(bad) = outcomes
                .iter()
                .find(|o| !o.is_aborted() && o.commit_ts < o.start_ts)
            {
                return Err(CodecError::CommitBeforeStart {
                    start_ts: bad.start_ts,
                    commit_ts: bad.commit_ts,
                });
            }
        }

        Ok(proposal)
    }

    /// Encode this proposal into an entry payload.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Start timestamp of a mutation.
    pub fn start_ts(&self) -> Option<u64> {
        match self {
            Proposal::Mutation { start_ts } => Some(*start_ts),
            Proposal::CommitDelta { .. } => None,
        }
    }

    /// Highest commit timestamp carried by a commit delta.
    ///
    /// Aborts contribute nothing; a delta made only of aborts yields `Some(0)`.
    pub fn max_commit_ts(&self) -> Option<u64> {
        match self {
            Proposal::Mutation { .. } => None,
            Proposal::CommitDelta { outcomes } => {
                Some(outcomes.iter().map(|o| o.commit_ts).max().unwrap_or(0))
            }
        }
    }

    pub fn is_commit(&self) -> bool {
        matches!(self, Proposal::CommitDelta { .. })
    }
}
