// THEORY:
// The `Rebalancer` is the scheduler of the system. Once per cycle it walks a frozen,
// ranked snapshot of the partition's regions and nudges each one towards K readings:
// settled regions are left alone, under-loaded regions annex area from their
// neighbors, over-loaded regions split part of themselves off.
//
// Key architectural principles:
// 1.  **Frozen order, live structure**: the processing order is computed once from the
//     counts at the start of the cycle and held fixed. Structural edits happen on the
//     live `Partition` underneath; ids deleted along the way are skipped, and regions
//     created by splits wait for the next cycle.
// 2.  **One touch per region per cycle**: the `processed` flag marks every region the
//     pass has acted on or taken area from, so no region is both grown and raided, or
//     raided twice, in the same cycle.
// 3.  **Bounded effort**: partial satisfaction is normal. A region that cannot get all
//     the area it wants is marked processed anyway and tried again next cycle, and a
//     neighbor that stops yielding cells is abandoned instead of retried forever.

use crate::core_modules::config::BalanceConfig;
use crate::core_modules::error::PartitionError;
use crate::core_modules::imbalance::imbalance;
use crate::core_modules::partition::Partition;
use crate::core_modules::region::RegionId;
use tracing::{debug, info, trace, warn};

/// What a single pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceSummary {
    /// Regions already holding exactly K readings.
    pub settled: usize,
    /// Under-loaded regions that went looking for area.
    pub grown: usize,
    /// Over-loaded regions that were asked to split.
    pub shrunk: usize,
    /// Snapshot entries skipped because they were processed or no longer existed.
    pub skipped: usize,
    /// Regions emptied and removed by a neighbor's growth.
    pub absorbed: usize,
    /// Regions created by splits.
    pub created: usize,
    /// Cells that changed owner through transfers.
    pub cells_transferred: usize,
    /// Neighbors that had area to spare but could not give any of it.
    pub stalled_transfers: usize,
}

/// Drives every region of a partition towards a fixed reading target.
#[derive(Debug, Clone)]
pub struct Rebalancer {
    target: u32,
    max_transfer_attempts: usize,
}

impl Rebalancer {
    pub fn new(target: u32, max_transfer_attempts: usize) -> Self {
        Self {
            target,
            max_transfer_attempts: max_transfer_attempts.max(1),
        }
    }

    pub fn from_config(config: &BalanceConfig) -> Self {
        Self::new(config.target, config.max_transfer_attempts)
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// A ranked snapshot of every live region, computed from the current counts.
    pub fn rank(&self, partition: &Partition) -> Vec<RegionId> {
        let mut order = partition.regions();
        imbalance::sort_by_rank(&mut order, partition, self.target);
        order
    }

    /// Runs one pass over `order`, which must have been taken from `partition` at the
    /// start of the cycle with processed flags reset afterwards.
    pub fn run_pass(
        &self,
        partition: &mut Partition,
        order: &[RegionId],
    ) -> Result<RebalanceSummary, PartitionError> {
        let mut summary = RebalanceSummary::default();

        for &id in order {
            let Some(region) = partition.region(id) else {
                trace!(region = %id, "Region no longer exists");
                summary.skipped += 1;
                continue;
            };
            if region.is_processed() {
                summary.skipped += 1;
                continue;
            }

            let count = region.reading_count();
            let area = region.area();
            info!(region = %id, count, area, "Next region");

            if count == self.target {
                info!(region = %id, "Needs no attention");
                partition.mark_processed(id)?;
                summary.settled += 1;
            } else if count < self.target {
                info!(region = %id, "Needs to grow");
                self.grow(partition, id, count, area, &mut summary)?;
                summary.grown += 1;
            } else {
                info!(region = %id, "Needs to shrink");
                self.shrink(partition, id, count, area, &mut summary)?;
                summary.shrunk += 1;
            }
        }

        Ok(summary)
    }

    fn grow(
        &self,
        partition: &mut Partition,
        id: RegionId,
        count: u32,
        area: usize,
        summary: &mut RebalanceSummary,
    ) -> Result<(), PartitionError> {
        let mut neighbors: Vec<RegionId> = partition
            .neighbors_of(id)?
            .into_iter()
            .filter(|n| partition.region(*n).is_some_and(|r| !r.is_processed()))
            .collect();
        debug!(region = %id, neighbors = neighbors.len(), "Found unprocessed neighbors");
        imbalance::sort_by_rank(&mut neighbors, partition, self.target);

        let diff = self.target as i64 - count as i64;
        let mut desired = imbalance::target_change(diff, area, self.target)? as i64;
        debug!(region = %id, desired, "Needs to grow by");

        for neighbor in neighbors {
            let Some(resource) = partition.region(neighbor) else {
                continue;
            };
            let available = resource.area() as i64;
            trace!(
                region = %id,
                neighbor = %neighbor,
                count = resource.reading_count(),
                area = available,
                "Considering neighbor"
            );

            // Swallow a neighbor whole when the combined load still fits the target.
            if resource.reading_count() + count <= self.target {
                desired = available;
            }

            if desired >= available {
                let moved = partition.transfer_cells(neighbor, id, desired as usize)?;
                summary.cells_transferred += moved;
                desired -= moved as i64;
                debug!(region = %id, neighbor = %neighbor, moved, "Took area from neighbor");
            } else if desired > 0 {
                let requested = desired;
                // One call already takes everything the neighbor can give towards this
                // region, so a short transfer ends the sequence.
                for _ in 0..self.max_transfer_attempts {
                    let moved = partition.transfer_cells(neighbor, id, desired as usize)?;
                    if moved == 0 {
                        warn!(
                            region = %id,
                            neighbor = %neighbor,
                            requested,
                            "Neighbor yields no area"
                        );
                        summary.stalled_transfers += 1;
                        break;
                    }
                    summary.cells_transferred += moved;
                    let short = (moved as i64) < desired;
                    desired -= moved as i64;
                    if short || desired <= 0 || !partition.contains_region(neighbor) {
                        break;
                    }
                }
                debug!(
                    region = %id,
                    neighbor = %neighbor,
                    consumed = requested - desired,
                    still_needs = desired,
                    "Took area from neighbor"
                );
            }

            if partition.contains_region(neighbor) {
                partition.mark_processed(neighbor)?;
            } else {
                summary.absorbed += 1;
            }

            if desired <= 0 {
                break;
            }
        }

        partition.mark_processed(id)
    }

    fn shrink(
        &self,
        partition: &mut Partition,
        id: RegionId,
        count: u32,
        area: usize,
        summary: &mut RebalanceSummary,
    ) -> Result<(), PartitionError> {
        let diff = self.target as i64 - count as i64;
        let change = imbalance::target_change(diff, area, self.target)?;
        debug!(region = %id, change, "Needs to shrink by");

        if let Some(new_id) = partition.record_split(id, change)? {
            trace!(region = %id, new_region = %new_id, "Created region");
            summary.created += 1;
        }
        partition.mark_processed(id)
    }
}
