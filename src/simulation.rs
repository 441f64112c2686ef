use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};
use varve_compaction::{CompactionConfig, CompactionError, Compactor, MemoryOracle, Snapshot};
use varve_core::{AppliedWatermark, HardState, LogEntry, Proposal, TxnOutcome};
use varve_store::{LogStore, MemoryLogStore};

/// Parameters of a replica simulation run
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub proposals: usize,
    pub apply_workers: usize,
    pub seed: u64,
    pub compaction: CompactionConfig,
}

/// Statistics collected during a simulation run
#[derive(Clone, Debug)]
pub struct SimulationStats {
    pub proposals: usize,
    pub apply_workers: usize,
    pub compaction_ticks: u64,
    pub snapshots_installed: u64,
    pub entries_compacted: u64,
    pub pending_halts: u64,
    pub undecodable_entries: u64,
    pub first_index: u64,
    pub last_index: u64,
    pub last_snapshot: Option<Snapshot>,
    pub total_time: Duration,
}

impl SimulationStats {
    pub fn print(&self) {
        let snapshot = self
            .last_snapshot
            .map(|s| format!("index {} @ ts {}", s.index, s.read_ts))
            .unwrap_or_else(|| "none".to_string());

        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Replica Simulation Statistics                 ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Proposals:                 {:>30} ║", self.proposals);
        println!("║  Apply Workers:             {:>30} ║", self.apply_workers);
        println!("║  Compaction Ticks:          {:>30} ║", self.compaction_ticks);
        println!("║  Snapshots Installed:       {:>30} ║", self.snapshots_installed);
        println!("║  Entries Compacted:         {:>30} ║", self.entries_compacted);
        println!("║  Scans Halted on Pending:   {:>30} ║", self.pending_halts);
        println!("║  Undecodable Entries:       {:>30} ║", self.undecodable_entries);
        println!("║  Retained Log:              {:>30} ║", format!("[{}, {}]", self.first_index, self.last_index));
        println!("║  Last Snapshot:             {:>30} ║", snapshot);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// Builds the proposal stream: transactions open with a mutation and are
/// later resolved in batches by commit deltas.
struct Proposer {
    rng: StdRng,
    next_ts: u64,
    open: Vec<u64>,
}

impl Proposer {
    fn new(seed: u64) -> Self {
        Proposer {
            rng: StdRng::seed_from_u64(seed),
            next_ts: 1,
            open: Vec::new(),
        }
    }

    fn next_ts(&mut self) -> u64 {
        let ts = self.next_ts;
        self.next_ts += 1;
        ts
    }

    fn next_entry(&mut self, index: u64, oracle: &MemoryOracle) -> Result<LogEntry, CompactionError> {
        let roll: u32 = self.rng.gen_range(0..100);

        // Occasional membership change and corrupt payload
        if roll < 2 {
            return Ok(LogEntry::other(index, 1, b"conf-change".to_vec()));
        }
        if roll < 3 {
            return Ok(LogEntry::new(index, 1, b"\x00corrupt".to_vec()));
        }

        if roll < 60 || self.open.is_empty() {
            let start_ts = self.next_ts();
            oracle.register_start_ts(start_ts);
            self.open.push(start_ts);
            return LogEntry::mutation(index, 1, start_ts).map_err(codec_error);
        }

        let batch = self.rng.gen_range(1..=self.open.len().min(4));
        let mut outcomes = Vec::with_capacity(batch);
        for _ in 0..batch {
            let pick = self.rng.gen_range(0..self.open.len());
            let start_ts = self.open.swap_remove(pick);
            let commit_ts = self.next_ts();
            if self.rng.gen_bool(0.1) {
                outcomes.push(TxnOutcome::aborted(start_ts));
            } else {
                outcomes.push(TxnOutcome::committed(start_ts, commit_ts));
            }
        }
        LogEntry::commit(index, 1, outcomes).map_err(codec_error)
    }

    /// Resolve every still-open transaction in one final delta. The delta
    /// is emitted even when nothing is open, as a commit heartbeat.
    fn drain(&mut self, index: u64) -> Result<LogEntry, CompactionError> {
        let open = std::mem::take(&mut self.open);
        let outcomes: Vec<_> = open
            .into_iter()
            .map(|start_ts| {
                let commit_ts = self.next_ts();
                TxnOutcome::committed(start_ts, commit_ts)
            })
            .collect();
        LogEntry::commit(index, 1, outcomes).map_err(codec_error)
    }
}

fn codec_error(e: varve_core::CodecError) -> CompactionError {
    CompactionError::Serialization(e.to_string())
}

/// Apply one entry: resolve transactions it commits, then mark it done.
async fn apply_worker(
    worker: usize,
    mut rx: mpsc::UnboundedReceiver<LogEntry>,
    oracle: Arc<MemoryOracle>,
    applied: Arc<AppliedWatermark>,
    seed: u64,
) {
    let mut rng = StdRng::seed_from_u64(seed ^ worker as u64);

    while let Some(entry) = rx.recv().await {
        tokio::time::sleep(Duration::from_micros(rng.gen_range(0..300))).await;

        if let Some(Ok(Proposal::CommitDelta { outcomes })) = entry.proposal() {
            oracle.apply_delta(&outcomes);
        }
        applied.mark_done(entry.index);
    }

    debug!(worker, "apply worker drained");
}

/// Run a replica with concurrent, out-of-order apply workers and a periodic
/// compaction loop.
pub async fn run_simulation(config: SimulationConfig) -> Result<SimulationStats, CompactionError> {
    let start = Instant::now();

    let store = Arc::new(Mutex::new(MemoryLogStore::new()));
    let oracle = Arc::new(MemoryOracle::new());
    let applied = Arc::new(AppliedWatermark::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Compaction loop
    let compaction = {
        let store = Arc::clone(&store);
        let mut compactor = Compactor::with_config(
            Arc::clone(&oracle),
            Arc::clone(&applied),
            config.compaction.clone(),
        );
        let mut ticker = tokio::time::interval(config.compaction.tick_interval());

        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let stopping = *shutdown_rx.borrow();

                let result = {
                    let mut store = store.lock().await;
                    compactor.tick(&mut *store)
                };
                if let Err(e) = result {
                    warn!(error = %e, "compaction tick failed");
                }

                if stopping {
                    break;
                }
            }
            compactor
        })
    };

    // Apply workers
    let mut senders = Vec::with_capacity(config.apply_workers);
    let mut workers = Vec::with_capacity(config.apply_workers);
    for worker in 0..config.apply_workers.max(1) {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.push(tx);
        workers.push(tokio::spawn(apply_worker(
            worker,
            rx,
            Arc::clone(&oracle),
            Arc::clone(&applied),
            config.seed,
        )));
    }

    // Proposer
    let mut proposer = Proposer::new(config.seed);
    let mut route = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let mut last_index = 0;
    for index in 1..=config.proposals as u64 {
        let mut entries = vec![proposer.next_entry(index, &oracle)?];
        if index == config.proposals as u64 {
            entries.push(proposer.drain(index + 1)?);
        }

        store
            .lock()
            .await
            .save(&HardState::new(1, 1, index), &entries, None)?;

        for entry in entries {
            last_index = entry.index;
            let worker = route.gen_range(0..senders.len());
            if senders[worker].send(entry).is_err() {
                warn!(worker, "apply worker stopped early");
            }
        }

        if index % 64 == 0 {
            tokio::task::yield_now().await;
        }
    }
    drop(senders);

    applied.wait_for_mark(last_index).await;
    join_all(workers).await;

    let _ = shutdown_tx.send(true);
    let compactor = compaction
        .await
        .map_err(|e| CompactionError::Config(format!("compaction task failed: {}", e)))?;

    let store = store.lock().await;
    let calculator = compactor.calculator_stats();
    Ok(SimulationStats {
        proposals: config.proposals,
        apply_workers: config.apply_workers,
        compaction_ticks: compactor.stats().ticks,
        snapshots_installed: compactor.stats().snapshots_installed,
        entries_compacted: compactor.stats().entries_compacted,
        pending_halts: calculator.pending_halts,
        undecodable_entries: calculator.undecodable_entries,
        first_index: store.first_index()?,
        last_index: store.last_index()?,
        last_snapshot: compactor.calculator().last_snapshot(),
        total_time: start.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use varve_compaction::CompactionConfigBuilder;

    #[tokio::test]
    async fn test_simulation_compacts_fully_resolved_log() {
        let config = SimulationConfig {
            proposals: 300,
            apply_workers: 4,
            seed: 7,
            compaction: CompactionConfigBuilder::new()
                .cadence_hint(0)
                .tick_interval(5)
                .build(),
        };

        let stats = run_simulation(config).await.unwrap();

        // Every txn is resolved before the final tick, so the last snapshot
        // covers the whole log.
        assert!(stats.snapshots_installed >= 1);
        assert_eq!(stats.first_index, stats.last_index + 1);
        assert_eq!(stats.last_snapshot.map(|s| s.index), Some(stats.last_index));
    }
}
