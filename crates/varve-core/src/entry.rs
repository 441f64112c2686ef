//! Raft log entries as seen by the compaction pipeline.

use crate::proposal::{CodecError, Proposal, TxnOutcome};
use serde::{Deserialize, Serialize};

/// Kind of a replicated log entry.
///
/// Only `Normal` entries carry proposals; everything else (membership
/// changes, leader no-ops with foreign payloads) is opaque to Varve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    #[default]
    Normal,
    Other,
}

/// A single entry in the replicated log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log, strictly increasing within the retained window.
    pub index: u64,

    /// Raft term the entry was proposed in.
    pub term: u64,

    /// Whether the payload is a proposal.
    pub kind: EntryKind,

    /// Encoded payload.
    pub payload: Vec<u8>,
}

impl LogEntry {
    /// Create a normal entry with a raw payload.
    pub fn new(index: u64, term: u64, payload: Vec<u8>) -> Self {
        LogEntry {
            index,
            term,
            kind: EntryKind::Normal,
            payload,
        }
    }

    /// Create a non-data entry (e.g. a configuration change).
    pub fn other(index: u64, term: u64, payload: Vec<u8>) -> Self {
        LogEntry {
            index,
            term,
            kind: EntryKind::Other,
            payload,
        }
    }

    /// Create a normal entry carrying an encoded proposal.
    pub fn from_proposal(index: u64, term: u64, proposal: &Proposal) -> Result<Self, CodecError> {
        Ok(Self::new(index, term, proposal.encode()?))
    }

    /// Create an entry opening (or continuing) the transaction at `start_ts`.
    pub fn mutation(index: u64, term: u64, start_ts: u64) -> Result<Self, CodecError> {
        Self::from_proposal(index, term, &Proposal::Mutation { start_ts })
    }

    /// Create an entry finalizing a batch of transactions.
    pub fn commit(
        index: u64,
        term: u64,
        outcomes: impl IntoIterator<Item = TxnOutcome>,
    ) -> Result<Self, CodecError> {
        Self::from_proposal(
            index,
            term,
            &Proposal::CommitDelta {
                outcomes: outcomes.into_iter().collect(),
            },
        )
    }

    /// Whether this entry is interpreted as a proposal.
    pub fn is_normal(&self) -> bool {
        self.kind == EntryKind::Normal
    }

    /// Decode the payload. Returns `None` for non-data entries.
    pub fn proposal(&self) -> Option<Result<Proposal, CodecError>> {
        if self.is_normal() {
            Some(Proposal::decode(&self.payload))
        } else {
            None
        }
    }
}

/// Persistent Raft voting state saved alongside entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardState {
    pub term: u64,
    pub vote: u64,
    pub commit: u64,
}

impl HardState {
    pub fn new(term: u64, vote: u64, commit: u64) -> Self {
        HardState { term, vote, commit }
    }

    /// An all-zero hard state carries no information.
    pub fn is_empty(&self) -> bool {
        *self == HardState::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_entry() {
        let entry = LogEntry::mutation(3, 1, 42).unwrap();

        assert_eq!(entry.index, 3);
        assert_eq!(entry.term, 1);
        assert!(entry.is_normal());
        assert_eq!(
            entry.proposal().unwrap().unwrap(),
            Proposal::Mutation { start_ts: 42 }
        );
    }

    #[test]
    fn test_commit_entry() {
        let entry = LogEntry::commit(4, 2, [TxnOutcome::committed(3, 4)]).unwrap();

        match entry.proposal().unwrap().unwrap() {
            Proposal::CommitDelta { outcomes } => {
                assert_eq!(outcomes, vec![TxnOutcome::committed(3, 4)]);
            }
            other => panic!("Expected commit delta, got {:?}", other),
        }
    }

    #[test]
    fn test_other_entry_is_not_decoded() {
        let entry = LogEntry::other(5, 1, b"conf-change".to_vec());

        assert!(!entry.is_normal());
        assert!(entry.proposal().is_none());
    }

    #[test]
    fn test_hard_state_empty() {
        assert!(HardState::default().is_empty());
        assert!(!HardState::new(1, 2, 3).is_empty());
    }
}
