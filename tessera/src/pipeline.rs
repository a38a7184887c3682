// THEORY:
// The `pipeline` module is the top-level API of the balancing engine. It strings the
// core stages together into one cycle and exposes the two seams the outside world
// plugs into: where readings come from (`SampleSource`) and who gets to look at the
// partition between cycles (`CycleObserver`).
//
// One cycle is:
//   reset counts -> attribute readings -> rank regions -> reset processed flags
//   -> rebalance pass
// The pipeline never stops by itself. `run` keeps going for as long as its caller's
// predicate says so, and that predicate is only consulted between cycles.

use crate::core_modules::config::BalanceConfig;
use crate::core_modules::error::PartitionError;
use crate::core_modules::grid::Point;
use crate::core_modules::imbalance::imbalance::{self, Load};
use crate::core_modules::partition::Partition;
use crate::core_modules::rebalancer::Rebalancer;
use tracing::{debug, info};

// Re-export key data structures for the public API.
pub use crate::core_modules::rebalancer::RebalanceSummary;

/// Supplies the readings of one cycle. Every point must lie inside the grid.
pub trait SampleSource {
    fn samples(&mut self, cycle: u64) -> Vec<Point>;
}

/// Error type observers report; the pipeline only forwards it.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Read-only view of the partition at the start of every cycle.
pub trait CycleObserver {
    fn observe(&mut self, cycle: u64, partition: &Partition) -> Result<(), ObserverError>;
}

/// An observer that looks at nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoObserver;

impl CycleObserver for NoObserver {
    fn observe(&mut self, _cycle: u64, _partition: &Partition) -> Result<(), ObserverError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error("observer failed on cycle {cycle}: {source}")]
    Observer {
        cycle: u64,
        #[source]
        source: ObserverError,
    },
}

/// What one cycle saw and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub readings: usize,
    /// Live regions after the pass.
    pub regions: usize,
    /// Regions below, at and above the target, by the counts after the pass.
    pub under: usize,
    pub at: usize,
    pub over: usize,
    pub summary: RebalanceSummary,
}

/// The main, top-level struct for the balancing engine.
pub struct BalancingPipeline {
    partition: Partition,
    rebalancer: Rebalancer,
    config: BalanceConfig,
    cycle: u64,
}

impl BalancingPipeline {
    pub fn new(config: BalanceConfig) -> Result<Self, PartitionError> {
        let partition = Partition::from_config(&config)?;
        Ok(Self::with_partition(partition, config))
    }

    /// Starts from an existing partition. Grid size fields of `config` are ignored.
    pub fn with_partition(partition: Partition, config: BalanceConfig) -> Self {
        Self {
            rebalancer: Rebalancer::from_config(&config),
            partition,
            config,
            cycle: 0,
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    /// Number of cycles completed so far.
    pub fn cycles_run(&self) -> u64 {
        self.cycle
    }

    /// Runs one full cycle on `samples`.
    pub fn run_cycle(&mut self, samples: &[Point]) -> Result<CycleReport, PartitionError> {
        self.cycle += 1;
        let cycle = self.cycle;
        info!(cycle, "Cycle started");

        self.partition.reset_counts();
        self.partition.attribute(samples)?;
        info!(cycle, readings = samples.len(), "Added reading locations");

        let order = self.rebalancer.rank(&self.partition);
        self.partition.reset_processed_flags();
        info!(cycle, regions = order.len(), "Ordered regions and reset usage");

        info!(cycle, "Running rebalance pass");
        let summary = self.rebalancer.run_pass(&mut self.partition, &order)?;

        if cfg!(debug_assertions) {
            self.partition.validate()?;
        }

        let (mut under, mut at, mut over) = (0, 0, 0);
        for region in self.partition.iter() {
            match imbalance::classify(region.reading_count(), self.rebalancer.target()) {
                Load::Under => under += 1,
                Load::At => at += 1,
                Load::Over => over += 1,
            }
        }

        let report = CycleReport {
            cycle,
            readings: samples.len(),
            regions: self.partition.len(),
            under,
            at,
            over,
            summary,
        };
        debug!(?report, "Cycle finished");
        Ok(report)
    }

    /// Runs cycles until `keep_going` returns false. The observer sees the partition
    /// before each cycle, numbered from 1. Returns the number of cycles run.
    pub fn run<S, O, F>(
        &mut self,
        source: &mut S,
        observer: &mut O,
        mut keep_going: F,
    ) -> Result<u64, PipelineError>
    where
        S: SampleSource + ?Sized,
        O: CycleObserver + ?Sized,
        F: FnMut(&CycleReport) -> bool,
    {
        let started = self.cycle;
        loop {
            let next = self.cycle + 1;
            observer
                .observe(next, &self.partition)
                .map_err(|source| PipelineError::Observer {
                    cycle: next,
                    source,
                })?;

            let samples = source.samples(next);
            let report = self.run_cycle(&samples)?;
            if !keep_going(&report) {
                break;
            }
        }
        Ok(self.cycle - started)
    }
}
