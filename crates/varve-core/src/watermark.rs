//! Applied watermark.
//!
//! Apply workers report completed log indices in any order; the watermark
//! only exposes the highest index below which every index has completed.
//! Completions that arrive ahead of a gap are parked in a sparse set and
//! folded into the contiguous prefix once the gap fills.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Monotonic "done-until" marker over log indices.
///
/// `mark_done` may be called concurrently from many workers. `done_until`
/// is a lock-free read and never blocks appliers.
pub struct AppliedWatermark {
    /// Highest contiguous completed index.
    done_until: AtomicU64,

    /// Completions strictly above `done_until + 1`.
    ahead: Mutex<BTreeSet<u64>>,

    /// Broadcast of `done_until` for waiters.
    notify: watch::Sender<u64>,
}

impl AppliedWatermark {
    /// Create a watermark whose floor is `initial` (0, or the index of a
    /// restored snapshot).
    pub fn new(initial: u64) -> Self {
        let (notify, _) = watch::channel(initial);
        AppliedWatermark {
            done_until: AtomicU64::new(initial),
            ahead: Mutex::new(BTreeSet::new()),
            notify,
        }
    }

    /// Largest index K such that every index <= K has been marked done.
    pub fn done_until(&self) -> u64 {
        self.done_until.load(Ordering::Acquire)
    }

    /// Number of completions parked behind an unfilled gap.
    pub fn pending_len(&self) -> usize {
        self.ahead.lock().len()
    }

    /// Record `index` as applied. Returns the resulting done-until value.
    ///
    /// Indices at or below the current floor are ignored.
    pub fn mark_done(&self, index: u64) -> u64 {
        let done = {
            let mut ahead = self.ahead.lock();
            let current = self.done_until.load(Ordering::Acquire);

            if index <= current {
                return current;
            }
            if index != current + 1 {
                ahead.insert(index);
                return current;
            }

            let done = Self::absorb(&mut ahead, index);
            self.done_until.store(done, Ordering::Release);
            done
        };

        self.publish(done);
        done
    }

    /// Raise the floor to `index` regardless of outstanding gaps.
    ///
    /// Used when restoring from a snapshot or when a single apply loop owns
    /// the log. Never lowers the watermark.
    pub fn set_done_until(&self, index: u64) -> u64 {
        let done = {
            let mut ahead = self.ahead.lock();
            let current = self.done_until.load(Ordering::Acquire);

            if index <= current {
                return current;
            }

            *ahead = match index.checked_add(1) {
                Some(next) => ahead.split_off(&next),
                None => BTreeSet::new(),
            };
            let done = Self::absorb(&mut ahead, index);
            self.done_until.store(done, Ordering::Release);
            done
        };

        self.publish(done);
        done
    }

    /// Wait until every index up to and including `index` has been applied.
    pub async fn wait_for_mark(&self, index: u64) -> u64 {
        let mut rx = self.notify.subscribe();
        let done = match rx.wait_for(|&done| done >= index).await {
            Ok(done) => *done,
            // The sender lives in `self`, so the channel cannot close while we
            // hold a reference.
            Err(_) => self.done_until(),
        };
        done
    }

    /// Extend `from` through any parked completions contiguous with it.
    fn absorb(ahead: &mut BTreeSet<u64>, from: u64) -> u64 {
        let mut done = from;
        while let Some(next) = done.checked_add(1) {
            if !ahead.remove(&next) {
                break;
            }
            done = next;
        }
        done
    }

    fn publish(&self, done: u64) {
        self.notify.send_if_modified(|value| {
            if done > *value {
                *value = done;
                true
            } else {
                false
            }
        });
    }
}

impl Default for AppliedWatermark {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for AppliedWatermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppliedWatermark")
            .field("done_until", &self.done_until())
            .field("pending", &self.pending_len())
            .finish()
    }
}
