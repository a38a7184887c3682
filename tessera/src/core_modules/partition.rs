// THEORY:
// The `Partition` is the owner and operator of the whole grid. It holds every live
// `Region` in an id-keyed arena, plus two dense row-major maps: which region owns
// each cell, and how many readings landed on each cell this cycle.
//
// Key architectural principles:
// 1.  **Exact cover**: every cell is owned by exactly one region at all times between
//     public calls. Structural edits (`transfer_cells`, `record_split`) update the
//     regions' cell sets and the owner map together before returning.
// 2.  **Stable handles**: regions are addressed by `RegionId`, never by reference.
//     The rebalancer iterates a frozen `Vec<RegionId>` snapshot while this arena is
//     edited underneath it; deleted ids simply stop resolving.
// 3.  **Counts travel with cells**: per-cell tallies let a region's reading count be
//     adjusted exactly when cells change hands, so counts stay truthful across a
//     whole cycle of edits rather than only right after attribution.

use crate::core_modules::config::BalanceConfig;
use crate::core_modules::error::PartitionError;
use crate::core_modules::grid::{GridSize, Point};
use crate::core_modules::region::{Region, RegionId};
use crate::core_modules::validation;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// The complete decomposition of a grid into regions.
#[derive(Debug, Clone)]
pub struct Partition {
    grid: GridSize,
    regions: BTreeMap<RegionId, Region>,
    /// Row-major owner of every cell.
    owner: Vec<RegionId>,
    /// Row-major reading tally of every cell for the current cycle.
    readings: Vec<u32>,
    next_id: u64,
}

impl Partition {
    /// A partition made of a single region covering the whole grid.
    pub fn new(width: u32, height: u32) -> Result<Self, PartitionError> {
        Self::tiled(width, height, width, height)
    }

    /// A partition made of `tile_width x tile_height` rectangles, clipped at the
    /// right and bottom edges.
    pub fn tiled(
        width: u32,
        height: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Self, PartitionError> {
        if width == 0 || height == 0 {
            return Err(PartitionError::InvalidConfig(format!(
                "grid must not be empty, got {width}x{height}"
            )));
        }
        if tile_width == 0 || tile_height == 0 {
            return Err(PartitionError::InvalidConfig(format!(
                "tiles must not be empty, got {tile_width}x{tile_height}"
            )));
        }

        let grid = GridSize::new(width, height);
        let tiles_across = width.div_ceil(tile_width);
        let tile_of =
            |p: Point| RegionId((p.y / tile_height * tiles_across + p.x / tile_width) as u64);

        let mut regions: BTreeMap<RegionId, Region> = BTreeMap::new();
        let mut owner = Vec::with_capacity(grid.cell_count());
        for p in grid.points() {
            let id = tile_of(p);
            owner.push(id);
            regions
                .entry(id)
                .or_insert_with(|| Region::new(id, BTreeSet::new()))
                .merge_cells([p]);
        }
        let next_id = regions.keys().next_back().map_or(0, |id| id.0 + 1);

        debug!(
            width,
            height,
            tile_width,
            tile_height,
            regions = regions.len(),
            "Initialized partition"
        );

        Ok(Self {
            grid,
            regions,
            owner,
            readings: vec![0; grid.cell_count()],
            next_id,
        })
    }

    pub fn from_config(config: &BalanceConfig) -> Result<Self, PartitionError> {
        config.validate()?;
        match config.initial_tile {
            Some(tile) => Self::tiled(config.width, config.height, tile.width, tile.height),
            None => Self::new(config.width, config.height),
        }
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    pub fn width(&self) -> u32 {
        self.grid.width
    }

    pub fn height(&self) -> u32 {
        self.grid.height
    }

    /// Number of live regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn contains_region(&self, id: RegionId) -> bool {
        self.regions.contains_key(&id)
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    fn region_mut(&mut self, id: RegionId) -> Result<&mut Region, PartitionError> {
        self.regions
            .get_mut(&id)
            .ok_or(PartitionError::UnknownRegion(id))
    }

    /// Live regions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    /// A snapshot of the ids of all live regions, in id order. The snapshot does not
    /// follow later structural edits.
    pub fn regions(&self) -> Vec<RegionId> {
        self.regions.keys().copied().collect()
    }

    /// The region owning `p`, or `None` if `p` is outside the grid.
    pub fn owner_of(&self, p: Point) -> Option<RegionId> {
        self.grid.contains(p).then(|| self.owner[self.grid.index(p)])
    }

    /// Readings attributed to the single cell `p` this cycle.
    pub fn readings_at(&self, p: Point) -> u32 {
        if self.grid.contains(p) {
            self.readings[self.grid.index(p)]
        } else {
            0
        }
    }

    /// Total readings attributed this cycle.
    pub fn total_readings(&self) -> u64 {
        self.readings.iter().map(|&n| n as u64).sum()
    }

    // --- Per-cycle bookkeeping ---

    /// Zeroes every region's reading count and every cell tally.
    pub fn reset_counts(&mut self) {
        self.readings.fill(0);
        for region in self.regions.values_mut() {
            region.set_reading_count(0);
        }
    }

    pub fn reset_processed_flags(&mut self) {
        for region in self.regions.values_mut() {
            region.set_processed(false);
        }
    }

    pub fn mark_processed(&mut self, id: RegionId) -> Result<(), PartitionError> {
        self.region_mut(id)?.set_processed(true);
        Ok(())
    }

    /// Attributes each sample to the region owning its cell.
    ///
    /// Fails without touching any count if a sample lies outside the grid.
    pub fn attribute(&mut self, samples: &[Point]) -> Result<(), PartitionError> {
        if let Some(&point) = samples.iter().find(|p| !self.grid.contains(**p)) {
            return Err(PartitionError::OutOfBounds {
                point,
                width: self.grid.width,
                height: self.grid.height,
            });
        }

        for &p in samples {
            let index = self.grid.index(p);
            self.readings[index] += 1;
            let owner = self.owner[index];
            let region = self.region_mut(owner)?;
            region.set_reading_count(region.reading_count() + 1);
        }
        Ok(())
    }

    // --- Queries ---

    /// Ids of the regions sharing at least one cell edge with `id`, in id order.
    pub fn neighbors_of(&self, id: RegionId) -> Result<Vec<RegionId>, PartitionError> {
        let region = self.region(id).ok_or(PartitionError::UnknownRegion(id))?;
        let neighbors: BTreeSet<RegionId> = region
            .cells()
            .iter()
            .flat_map(|&p| self.grid.neighbors4(p))
            .map(|q| self.owner[self.grid.index(q)])
            .filter(|&owner| owner != id)
            .collect();
        Ok(neighbors.into_iter().collect())
    }

    // --- Structural edits ---

    /// Moves up to `max_cells` cells from `from` to `to` and returns how many moved.
    ///
    /// Cells are taken from the shared boundary outward, starting next to the cell of
    /// `to` picked by `Region::boundary_start_towards`. Reading tallies move with the
    /// cells. When `from` loses its last cell it is removed from the partition.
    pub fn transfer_cells(
        &mut self,
        from: RegionId,
        to: RegionId,
        max_cells: usize,
    ) -> Result<usize, PartitionError> {
        if from == to {
            return Err(PartitionError::NotAdjacent { from, to });
        }
        let donor = self.region(from).ok_or(PartitionError::UnknownRegion(from))?;
        let receiver = self.region(to).ok_or(PartitionError::UnknownRegion(to))?;
        let start = receiver.boundary_start_towards(donor)?;

        let grid = self.grid;
        let owner = &self.owner;
        let donor = self
            .regions
            .get_mut(&from)
            .ok_or(PartitionError::UnknownRegion(from))?;
        let moved = donor.consume_area(max_cells, start, |q| {
            grid.contains(q) && owner[grid.index(q)] == to
        });

        let moved_readings: u32 = moved.iter().map(|&p| self.readings[grid.index(p)]).sum();
        donor.set_reading_count(donor.reading_count() - moved_readings);
        let emptied = donor.area() == 0;

        for &p in &moved {
            self.owner[grid.index(p)] = to;
        }
        let count = moved.len();
        let receiver = self.region_mut(to)?;
        receiver.merge_cells(moved);
        receiver.set_reading_count(receiver.reading_count() + moved_readings);

        trace!(from = %from, to = %to, requested = max_cells, moved = count, "Transferred cells");

        if emptied {
            self.regions.remove(&from);
            debug!(absorbed = %from, by = %to, "Region fully absorbed");
        }
        Ok(count)
    }

    /// Splits up to `amount` cells off `id` into a new region and returns its id, or
    /// `None` if the region could not be split.
    pub fn record_split(
        &mut self,
        id: RegionId,
        amount: usize,
    ) -> Result<Option<RegionId>, PartitionError> {
        let new_id = RegionId(self.next_id);
        let region = self.region_mut(id)?;
        let Some(mut carved) = region.split(amount, new_id) else {
            return Ok(None);
        };
        self.next_id += 1;

        let grid = self.grid;
        let carved_readings: u32 = carved
            .cells()
            .iter()
            .map(|&p| self.readings[grid.index(p)])
            .sum();
        carved.set_reading_count(carved_readings);
        for &p in carved.cells() {
            self.owner[grid.index(p)] = new_id;
        }

        let region = self.region_mut(id)?;
        region.set_reading_count(region.reading_count() - carved_readings);
        debug!(
            region = %id,
            new_region = %new_id,
            requested = amount,
            carved = carved.area(),
            remaining = region.area(),
            "Split region"
        );

        self.regions.insert(new_id, carved);
        validation::check_pair(self, id, new_id)?;
        Ok(Some(new_id))
    }

    /// Re-derives every invariant from scratch.
    pub fn validate(&self) -> Result<(), PartitionError> {
        validation::check_invariants(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: u32, y: u32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn new_partition_is_one_region() {
        let partition = Partition::new(5, 4).unwrap();
        assert_eq!(partition.len(), 1);
        let region = partition.iter().next().unwrap();
        assert_eq!(region.area(), 20);
        partition.validate().unwrap();
    }

    #[test]
    fn tiled_partition_clips_edge_tiles() {
        let partition = Partition::tiled(5, 5, 2, 2).unwrap();
        assert_eq!(partition.len(), 9);
        let areas: Vec<usize> = partition.iter().map(Region::area).collect();
        assert_eq!(areas, vec![4, 4, 2, 4, 4, 2, 2, 2, 1]);
        partition.validate().unwrap();
    }

    #[test]
    fn empty_grid_is_rejected() {
        assert!(matches!(
            Partition::new(0, 3),
            Err(PartitionError::InvalidConfig(_))
        ));
        assert!(matches!(
            Partition::tiled(3, 3, 0, 1),
            Err(PartitionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn attribute_counts_membership() {
        let mut partition = Partition::tiled(4, 2, 2, 2).unwrap();
        partition
            .attribute(&[p(0, 0), p(1, 1), p(3, 0), p(0, 0)])
            .unwrap();
        let counts: Vec<u32> = partition.iter().map(Region::reading_count).collect();
        assert_eq!(counts, vec![3, 1]);
        assert_eq!(partition.readings_at(p(0, 0)), 2);
        assert_eq!(partition.total_readings(), 4);
        partition.validate().unwrap();
    }

    #[test]
    fn attribute_out_of_bounds_changes_nothing() {
        let mut partition = Partition::new(3, 3).unwrap();
        let err = partition.attribute(&[p(1, 1), p(3, 0)]).unwrap_err();
        assert_eq!(
            err,
            PartitionError::OutOfBounds {
                point: p(3, 0),
                width: 3,
                height: 3
            }
        );
        assert_eq!(partition.total_readings(), 0);
        assert_eq!(partition.iter().next().unwrap().reading_count(), 0);
    }

    #[test]
    fn reset_clears_counts_and_flags() {
        let mut partition = Partition::tiled(4, 4, 2, 2).unwrap();
        partition.attribute(&[p(0, 0), p(3, 3)]).unwrap();
        let first = partition.regions()[0];
        partition.mark_processed(first).unwrap();

        partition.reset_counts();
        partition.reset_processed_flags();
        assert!(partition.iter().all(|r| r.reading_count() == 0 && !r.is_processed()));
        assert_eq!(partition.total_readings(), 0);
    }

    #[test]
    fn neighbors_follow_shared_edges() {
        let partition = Partition::tiled(6, 6, 2, 2).unwrap();
        // Tile ids are row-major: R4 is the center tile.
        let neighbors = partition.neighbors_of(RegionId(4)).unwrap();
        assert_eq!(
            neighbors,
            vec![RegionId(1), RegionId(3), RegionId(5), RegionId(7)]
        );
        let corner = partition.neighbors_of(RegionId(0)).unwrap();
        assert_eq!(corner, vec![RegionId(1), RegionId(3)]);
    }

    #[test]
    fn transfer_moves_cells_and_readings() {
        let mut partition = Partition::tiled(6, 3, 3, 3).unwrap();
        partition.attribute(&[p(3, 1), p(5, 2)]).unwrap();

        let moved = partition.transfer_cells(RegionId(1), RegionId(0), 4).unwrap();
        assert_eq!(moved, 4);
        assert_eq!(partition.region(RegionId(0)).unwrap().area(), 13);
        assert_eq!(partition.region(RegionId(1)).unwrap().area(), 5);
        // The cell next to the shared edge carried its reading over.
        assert_eq!(partition.owner_of(p(3, 1)), Some(RegionId(0)));
        assert_eq!(partition.region(RegionId(0)).unwrap().reading_count(), 1);
        assert_eq!(partition.region(RegionId(1)).unwrap().reading_count(), 1);
        partition.validate().unwrap();
    }

    #[test]
    fn transfer_of_everything_removes_the_donor() {
        let mut partition = Partition::tiled(4, 2, 2, 2).unwrap();
        partition.attribute(&[p(3, 1)]).unwrap();
        let moved = partition.transfer_cells(RegionId(1), RegionId(0), 100).unwrap();
        assert_eq!(moved, 4);
        assert!(!partition.contains_region(RegionId(1)));
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.region(RegionId(0)).unwrap().reading_count(), 1);
        partition.validate().unwrap();
    }

    #[test]
    fn transfer_between_distant_regions_fails() {
        let mut partition = Partition::tiled(6, 2, 2, 2).unwrap();
        let err = partition.transfer_cells(RegionId(2), RegionId(0), 1).unwrap_err();
        assert_eq!(
            err,
            PartitionError::NotAdjacent {
                from: RegionId(2),
                to: RegionId(0)
            }
        );
        partition.validate().unwrap();
    }

    #[test]
    fn transfer_from_unknown_region_fails() {
        let mut partition = Partition::new(2, 2).unwrap();
        assert_eq!(
            partition.transfer_cells(RegionId(7), RegionId(0), 1),
            Err(PartitionError::UnknownRegion(RegionId(7)))
        );
    }

    #[test]
    fn split_inserts_new_region_with_fresh_id() {
        let mut partition = Partition::new(4, 4).unwrap();
        partition.attribute(&[p(0, 0), p(3, 3), p(2, 2)]).unwrap();

        let new_id = partition.record_split(RegionId(0), 5).unwrap().unwrap();
        assert_eq!(new_id, RegionId(1));
        assert_eq!(partition.len(), 2);
        assert_eq!(partition.region(new_id).unwrap().area(), 5);
        assert_eq!(partition.region(RegionId(0)).unwrap().area(), 11);
        partition.validate().unwrap();

        let total: u32 = partition.iter().map(Region::reading_count).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn split_of_nothing_keeps_ids_unused() {
        let mut partition = Partition::new(1, 1).unwrap();
        assert_eq!(partition.record_split(RegionId(0), 3).unwrap(), None);
        let mut partition = Partition::new(2, 1).unwrap();
        assert_eq!(
            partition.record_split(RegionId(0), 1).unwrap(),
            Some(RegionId(1))
        );
    }
}
