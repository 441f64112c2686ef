//! High-level compaction driver.
//!
//! The Compactor is the caller the calculator hands its result to: it runs
//! the calculation on a cadence and installs produced snapshots into the
//! log store.

use crate::calculator::{CalculatorStats, SnapshotCalculator};
use crate::error::{CompactionError, Result};
use crate::oracle::Oracle;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use varve_core::AppliedWatermark;
use varve_store::LogStore;

/// Configuration for the compactor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Minimum span of applied entries (`until - first`) before a
    /// calculation is attempted.
    pub cadence_hint: u64,

    /// How often the driver should tick (in milliseconds).
    pub tick_interval_ms: u64,

    /// Whether produced snapshots are installed into the log store.
    pub install_snapshots: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        CompactionConfig {
            cadence_hint: 1,
            tick_interval_ms: 1000,
            install_snapshots: true,
        }
    }
}

impl CompactionConfig {
    /// Parse a JSON configuration document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CompactionConfig =
            serde_json::from_str(json).map_err(|e| CompactionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(CompactionError::Config(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Builder for compaction configuration.
pub struct CompactionConfigBuilder {
    config: CompactionConfig,
}

impl CompactionConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CompactionConfig::default(),
        }
    }

    pub fn cadence_hint(mut self, entries: u64) -> Self {
        self.config.cadence_hint = entries;
        self
    }

    pub fn tick_interval(mut self, ms: u64) -> Self {
        self.config.tick_interval_ms = ms;
        self
    }

    pub fn install_snapshots(mut self, enabled: bool) -> Self {
        self.config.install_snapshots = enabled;
        self
    }

    pub fn build(self) -> CompactionConfig {
        self.config
    }
}

impl Default for CompactionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about compaction operations.
#[derive(Clone, Debug, Default)]
pub struct CompactionStats {
    /// Total ticks.
    pub ticks: u64,

    /// Snapshots installed into the store.
    pub snapshots_installed: u64,

    /// Entries folded away by installed snapshots.
    pub entries_compacted: u64,

    /// Most recently installed snapshot.
    pub last_installed: Option<Snapshot>,
}

/// Result of a single tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactionResult {
    /// Snapshot calculated, if any.
    pub snapshot: Option<Snapshot>,

    /// Whether the snapshot was installed.
    pub installed: bool,

    /// The store's first retained index after the tick.
    pub first_index: u64,
}

/// Drives snapshot calculation and installation for one replica.
pub struct Compactor<O> {
    calculator: SnapshotCalculator<O>,
    config: CompactionConfig,
    stats: CompactionStats,
}

impl<O: Oracle> Compactor<O> {
    /// Create a compactor with default configuration.
    pub fn new(oracle: O, applied: Arc<AppliedWatermark>) -> Self {
        Self::with_config(oracle, applied, CompactionConfig::default())
    }

    /// Create a compactor with custom configuration.
    pub fn with_config(oracle: O, applied: Arc<AppliedWatermark>, config: CompactionConfig) -> Self {
        Compactor {
            calculator: SnapshotCalculator::new(oracle, applied),
            config,
            stats: CompactionStats::default(),
        }
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub fn calculator(&self) -> &SnapshotCalculator<O> {
        &self.calculator
    }

    pub fn calculator_stats(&self) -> &CalculatorStats {
        self.calculator.stats()
    }

    pub fn stats(&self) -> &CompactionStats {
        &self.stats
    }

    /// Restore forward-progress state from the store's installed snapshot.
    ///
    /// Raises the applied watermark to the snapshot index, since everything
    /// folded into it is applied by definition.
    pub fn bootstrap<S: LogStore + ?Sized>(&mut self, store: &S) -> Result<Option<Snapshot>> {
        let Some(snapshot) = Snapshot::from_meta(&store.snapshot()?)? else {
            return Ok(None);
        };

        self.calculator.applied().set_done_until(snapshot.index);
        self.calculator.resume_from(snapshot);
        info!(
            index = snapshot.index,
            read_ts = snapshot.read_ts,
            "resumed from installed snapshot"
        );

        Ok(Some(snapshot))
    }

    /// Calculate a snapshot and, if configured, install it.
    pub fn tick<S: LogStore + ?Sized>(&mut self, store: &mut S) -> Result<CompactionResult> {
        self.stats.ticks += 1;

        let snapshot = self
            .calculator
            .calculate_snapshot(&*store, self.config.cadence_hint)?;

        let mut result = CompactionResult {
            snapshot,
            installed: false,
            first_index: 0,
        };

        if let Some(snapshot) = snapshot.filter(|_| self.config.install_snapshots) {
            let before = store.first_index()?;
            store
                .create_snapshot(snapshot.index, snapshot.to_bytes()?)
                .map_err(CompactionError::Install)?;

            result.installed = true;
            self.stats.snapshots_installed += 1;
            self.stats.entries_compacted += snapshot.index + 1 - before;
            self.stats.last_installed = Some(snapshot);
            info!(
                index = snapshot.index,
                read_ts = snapshot.read_ts,
                compacted = snapshot.index + 1 - before,
                "installed snapshot"
            );
        } else if snapshot.is_some() {
            debug!("snapshot installation disabled");
        }

        result.first_index = store.first_index()?;
        Ok(result)
    }
}
