//! Property tests for log store truncation semantics.
//!
//! These tests verify:
//! - Installing a snapshot at `i` leaves `first_index() == i + 1`
//! - Entries above the snapshot stay retrievable and in order
//! - Entries at or below the snapshot are never returned again

use proptest::prelude::*;
use varve_core::{HardState, LogEntry};
use varve_store::{LogStore, MemoryLogStore, StoreError};

fn batch(from: u64, len: u64) -> Vec<LogEntry> {
    (from..from + len)
        .map(|i| LogEntry::new(i, 1, i.to_le_bytes().to_vec()))
        .collect()
}

#[derive(Clone, Debug)]
enum Op {
    Append(u64),
    Snapshot(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..8).prop_map(Op::Append),
        (0u64..8).prop_map(Op::Snapshot),
    ]
}

proptest! {
    #[test]
    fn snapshot_installation_truncates_prefix(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut store = MemoryLogStore::new();
        let mut installed = 0u64;

        for op in ops {
            match op {
                Op::Append(len) => {
                    let next = store.last_index().unwrap() + 1;
                    store.save(&HardState::default(), &batch(next, len), None).unwrap();
                }
                Op::Snapshot(offset) => {
                    let first = store.first_index().unwrap();
                    let last = store.last_index().unwrap();
                    if first > last {
                        continue;
                    }
                    let index = (first + offset).min(last);
                    store.create_snapshot(index, Vec::new()).unwrap();
                    installed = index;
                }
            }

            let first = store.first_index().unwrap();
            let last = store.last_index().unwrap();
            prop_assert_eq!(first, installed + 1);

            if first <= last {
                let entries = store.entries(first, last).unwrap();
                let indices: Vec<u64> = entries.iter().map(|e| e.index).collect();
                prop_assert_eq!(indices, (first..=last).collect::<Vec<_>>());
            }
            if installed > 0 {
                let compacted = matches!(
                    store.entries(installed, last.max(installed)),
                    Err(StoreError::Compacted { .. })
                );
                prop_assert!(compacted);
            }
        }
    }
}
