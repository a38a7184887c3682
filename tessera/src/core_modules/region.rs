// THEORY:
// A `Region` is one tile of the partition: a 4-connected, hole-free set of grid
// cells plus the bookkeeping the rebalancer needs for the current cycle (how many
// readings fell inside it, and whether it has already been handled).
//
// Key architectural principles:
// 1.  **Shape-preserving edits only**: every operation that removes or adds cells
//     (`consume_area`, `split`) moves one *simple point* at a time, so the region
//     and whoever receives its cells keep their topology after every single step.
//     A region therefore never needs repairing after an edit.
// 2.  **No global knowledge**: a region does not know the grid size, the owner
//     lookup or other regions. Whatever it needs to know about the receiving side
//     of a transfer is handed to it as a membership closure by the `Partition`.
// 3.  **Counts are bookkeeping**: `reading_count` is maintained by the `Partition`,
//     which owns the per-cell tallies and moves them along with the cells.

use crate::core_modules::error::PartitionError;
use crate::core_modules::grid::{self, Point};
use std::collections::BTreeSet;
use std::fmt;

/// A stable handle to a region. Ids are never reused within a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// A connected, hole-free set of grid cells and its per-cycle load.
#[derive(Debug, Clone)]
pub struct Region {
    id: RegionId,
    cells: BTreeSet<Point>,
    reading_count: u32,
    processed: bool,
}

impl Region {
    pub(crate) fn new(id: RegionId, cells: BTreeSet<Point>) -> Self {
        Self {
            id,
            cells,
            reading_count: 0,
            processed: false,
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn area(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &BTreeSet<Point> {
        &self.cells
    }

    pub fn contains(&self, p: Point) -> bool {
        self.cells.contains(&p)
    }

    pub fn reading_count(&self) -> u32 {
        self.reading_count
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub(crate) fn set_processed(&mut self, processed: bool) {
        self.processed = processed;
    }

    pub(crate) fn set_reading_count(&mut self, count: u32) {
        self.reading_count = count;
    }

    /// Top-left and bottom-right corners of the smallest box enclosing the region.
    pub fn bounding_box(&self) -> Option<(Point, Point)> {
        let first = self.cells.first()?;
        let (mut min, mut max) = (*first, *first);
        for p in &self.cells {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some((min, max))
    }

    /// The mean position of the region's cells.
    pub fn centroid(&self) -> (f64, f64) {
        let n = self.cells.len().max(1) as f64;
        let (sx, sy) = self
            .cells
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
        (sx / n, sy / n)
    }

    /// A cell of this region that touches `neighbor` along an edge.
    ///
    /// Among all such cells the one closest to this region's centroid wins, so that
    /// growth starts where it keeps the region compact; ties go to the smallest point.
    pub fn boundary_start_towards(&self, neighbor: &Region) -> Result<Point, PartitionError> {
        let (cx, cy) = self.centroid();
        let distance = |p: &Point| (p.x as f64 - cx).powi(2) + (p.y as f64 - cy).powi(2);

        self.cells
            .iter()
            .filter(|p| p.neighbors4().any(|q| neighbor.contains(q)))
            .min_by(|a, b| distance(a).total_cmp(&distance(b)).then_with(|| a.cmp(b)))
            .copied()
            .ok_or(PartitionError::NotAdjacent {
                from: neighbor.id,
                to: self.id,
            })
    }

    /// Whether `p` can leave this region without disconnecting it or opening a hole.
    /// The last remaining cell can always leave.
    fn can_release(&self, p: Point) -> bool {
        releasable(&self.cells, p)
    }

    /// Removes up to `max_cells` cells and returns them.
    ///
    /// `receiver` reports membership of the region the cells are given to. Only cells
    /// touching the receiver (or cells already taken by this call) are eligible, and a
    /// cell is taken only if it is simple for both sides, so this region stays
    /// connected and hole-free and the receiver stays so once the cells are merged.
    /// Eligible cells are taken closest-first to `start_hint`.
    ///
    /// The call keeps going until `max_cells` are taken or nothing eligible is left. An
    /// empty result therefore means no further progress is possible towards this
    /// receiver, and repeating the call would not change that.
    pub fn consume_area<F>(
        &mut self,
        max_cells: usize,
        start_hint: Point,
        receiver: F,
    ) -> BTreeSet<Point>
    where
        F: Fn(Point) -> bool,
    {
        let mut taken = BTreeSet::new();
        if max_cells == 0 {
            return taken;
        }

        let mut frontier: BTreeSet<Point> = self
            .cells
            .iter()
            .copied()
            .filter(|p| p.neighbors4().any(&receiver))
            .collect();

        while taken.len() < max_cells {
            let joined = |q: Point| receiver(q) || taken.contains(&q);
            let pick = frontier
                .iter()
                .copied()
                .filter(|&p| self.can_release(p) && grid::is_simple(p, &joined))
                .min_by_key(|&p| (p.manhattan(start_hint), p));

            let Some(p) = pick else { break };
            frontier.remove(&p);
            self.cells.remove(&p);
            taken.insert(p);
            frontier.extend(p.neighbors4().filter(|q| self.cells.contains(q)));
        }

        taken
    }

    /// Adds cells released by another region.
    pub fn merge_cells<I>(&mut self, cells: I)
    where
        I: IntoIterator<Item = Point>,
    {
        self.cells.extend(cells);
    }

    /// Carves a connected, hole-free piece of at most `amount` cells out of this region
    /// and returns it as a new region with id `new_id`.
    ///
    /// At least one cell always stays behind. Returns `None` when nothing can be carved:
    /// `amount` is zero or the region is a single cell.
    ///
    /// Every releasable cell is tried as a seed, in point order, and the first piece
    /// reaching `amount` wins. If none does, the part that stays is grown instead and
    /// everything outside it is handed over. Only when both searches fall short does
    /// the piece come out smaller; it is then the largest one found.
    pub fn split(&mut self, amount: usize, new_id: RegionId) -> Option<Region> {
        let amount = amount.min(self.area().saturating_sub(1));
        if amount == 0 {
            return None;
        }
        let keep = self.area() - amount;

        let seeds: Vec<Point> = self
            .cells
            .iter()
            .copied()
            .filter(|&p| self.can_release(p))
            .collect();

        let mut best = BTreeSet::new();
        for &seed in &seeds {
            let piece = carve(&self.cells, seed, amount);
            if piece.len() > best.len() {
                best = piece;
            }
            if best.len() == amount {
                break;
            }
        }

        if best.len() < amount {
            let handed_over = seeds
                .iter()
                .map(|&seed| carve(&self.cells, seed, keep))
                .find(|kept| kept.len() == keep)
                .map(|kept| self.cells.difference(&kept).copied().collect());
            if let Some(piece) = handed_over {
                best = piece;
            }
        }

        if best.is_empty() {
            return None;
        }
        self.cells.retain(|p| !best.contains(p));
        Some(Region::new(new_id, best))
    }
}

/// Whether `p` can leave `cells` without disconnecting them or opening a hole.
fn releasable(cells: &BTreeSet<Point>, p: Point) -> bool {
    cells.len() == 1 || grid::is_simple(p, |q| cells.contains(&q))
}

/// Grows a piece of up to `amount` cells of `cells` from `seed`, closest-first. A cell
/// joins only if the piece and the cells left behind both stay connected and hole-free.
fn carve(cells: &BTreeSet<Point>, seed: Point, amount: usize) -> BTreeSet<Point> {
    let mut rest = cells.clone();
    rest.remove(&seed);

    let mut carved = BTreeSet::from([seed]);
    let mut frontier: BTreeSet<Point> = seed.neighbors4().filter(|q| rest.contains(q)).collect();

    while carved.len() < amount {
        let pick = frontier
            .iter()
            .copied()
            .filter(|&p| releasable(&rest, p) && grid::is_simple(p, |q| carved.contains(&q)))
            .min_by_key(|&p| (p.manhattan(seed), p));

        let Some(p) = pick else { break };
        frontier.remove(&p);
        rest.remove(&p);
        carved.insert(p);
        frontier.extend(p.neighbors4().filter(|q| rest.contains(q)));
    }

    carved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::validation;

    fn rect(id: u64, x0: u32, y0: u32, w: u32, h: u32) -> Region {
        let cells = (x0..x0 + w)
            .flat_map(|x| (y0..y0 + h).map(move |y| Point::new(x, y)))
            .collect();
        Region::new(RegionId(id), cells)
    }

    #[test]
    fn area_and_bounding_box() {
        let region = rect(1, 2, 3, 4, 5);
        assert_eq!(region.area(), 20);
        assert_eq!(
            region.bounding_box(),
            Some((Point::new(2, 3), Point::new(5, 7)))
        );
    }

    #[test]
    fn boundary_start_lies_on_shared_edge() {
        let left = rect(1, 0, 0, 3, 3);
        let right = rect(2, 3, 0, 3, 3);
        let start = left.boundary_start_towards(&right).unwrap();
        assert_eq!(start, Point::new(2, 1));
        let back = right.boundary_start_towards(&left).unwrap();
        assert_eq!(back, Point::new(3, 1));
    }

    #[test]
    fn boundary_start_fails_for_distant_regions() {
        let a = rect(1, 0, 0, 2, 2);
        let b = rect(2, 5, 5, 2, 2);
        assert_eq!(
            a.boundary_start_towards(&b),
            Err(PartitionError::NotAdjacent {
                from: RegionId(2),
                to: RegionId(1)
            })
        );
    }

    #[test]
    fn consume_takes_cells_next_to_receiver() {
        let receiver = rect(1, 0, 0, 2, 4);
        let mut donor = rect(2, 2, 0, 4, 4);
        let start = receiver.boundary_start_towards(&donor).unwrap();
        let taken = donor.consume_area(5, start, |q| receiver.contains(q));

        assert_eq!(taken.len(), 5);
        assert_eq!(donor.area(), 11);
        assert!(validation::check_shape(&donor).is_ok());

        let mut grown = receiver.clone();
        grown.merge_cells(taken);
        assert_eq!(grown.area(), 13);
        assert!(validation::check_shape(&grown).is_ok());
    }

    #[test]
    fn consume_everything_empties_the_donor() {
        let receiver = rect(1, 0, 0, 1, 3);
        let mut donor = rect(2, 1, 0, 2, 3);
        let start = receiver.boundary_start_towards(&donor).unwrap();
        let taken = donor.consume_area(100, start, |q| receiver.contains(q));
        assert_eq!(taken.len(), 6);
        assert_eq!(donor.area(), 0);
    }

    #[test]
    fn consume_zero_is_a_no_op() {
        let receiver = rect(1, 0, 0, 1, 3);
        let mut donor = rect(2, 1, 0, 2, 3);
        let taken = donor.consume_area(0, Point::new(0, 0), |q| receiver.contains(q));
        assert!(taken.is_empty());
        assert_eq!(donor.area(), 6);
    }

    #[test]
    fn consume_never_wraps_the_receiver_around_a_third_region() {
        // The receiver is the left column and the donor is a C opening towards it,
        // cupping (1, 1) which belongs to somebody else. Taking the whole C would
        // enclose that cell.
        let receiver = rect(1, 0, 0, 1, 3);
        let cup: BTreeSet<Point> = [(1, 0), (2, 0), (2, 1), (2, 2), (1, 2)]
            .into_iter()
            .map(|(x, y)| Point::new(x, y))
            .collect();
        let mut donor = Region::new(RegionId(2), cup);
        assert!(validation::check_shape(&donor).is_ok());

        let start = receiver.boundary_start_towards(&donor).unwrap();
        let taken = donor.consume_area(100, start, |q| receiver.contains(q));

        let mut grown = receiver.clone();
        grown.merge_cells(taken.iter().copied());
        assert!(validation::check_shape(&grown).is_ok());
        assert_eq!(taken.len(), 4);
        assert_eq!(donor.cells().iter().copied().collect::<Vec<_>>(), vec![Point::new(2, 2)]);
    }

    #[test]
    fn split_carves_connected_piece() {
        let mut region = rect(1, 0, 0, 4, 4);
        let piece = region.split(5, RegionId(9)).unwrap();
        assert_eq!(piece.id(), RegionId(9));
        assert_eq!(piece.area(), 5);
        assert_eq!(region.area(), 11);
        assert!(piece.cells().is_disjoint(region.cells()));
        assert!(validation::check_shape(&piece).is_ok());
        assert!(validation::check_shape(&region).is_ok());
    }

    #[test]
    fn split_leaves_at_least_one_cell() {
        let mut region = rect(1, 0, 0, 3, 1);
        let piece = region.split(10, RegionId(2)).unwrap();
        assert_eq!(piece.area(), 2);
        assert_eq!(region.area(), 1);
    }

    #[test]
    fn split_of_single_cell_or_zero_amount_does_nothing() {
        let mut single = rect(1, 0, 0, 1, 1);
        assert!(single.split(3, RegionId(2)).is_none());
        let mut block = rect(3, 0, 0, 2, 2);
        assert!(block.split(0, RegionId(4)).is_none());
        assert_eq!(block.area(), 4);
    }

    fn shape(id: u64, cells: &[(u32, u32)]) -> Region {
        Region::new(
            RegionId(id),
            cells.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        )
    }

    // Two stubs hang off the left end of a bar and one off its middle, so growing a
    // piece from any of the first few seeds gets stuck after one cell.
    const STUBBED_BAR: [(u32, u32); 7] =
        [(7, 18), (8, 17), (8, 18), (9, 18), (9, 19), (10, 17), (10, 18)];

    #[test]
    fn split_tries_other_seeds_until_the_piece_is_full() {
        let mut region = shape(1, &STUBBED_BAR);
        let piece = region.split(2, RegionId(2)).unwrap();

        assert_eq!(
            piece.cells().iter().copied().collect::<Vec<_>>(),
            vec![Point::new(10, 17), Point::new(10, 18)]
        );
        assert_eq!(region.area(), 5);
        assert!(validation::check_shape(&piece).is_ok());
        assert!(validation::check_shape(&region).is_ok());
    }

    #[test]
    fn split_grows_the_remainder_when_no_piece_can_be_grown() {
        let mut region = shape(1, &STUBBED_BAR);
        let piece = region.split(5, RegionId(2)).unwrap();

        assert_eq!(piece.area(), 5);
        assert_eq!(
            region.cells().iter().copied().collect::<Vec<_>>(),
            vec![Point::new(10, 17), Point::new(10, 18)]
        );
        assert!(validation::check_shape(&piece).is_ok());
        assert!(validation::check_shape(&region).is_ok());
    }

    #[test]
    fn split_of_a_plus_sign_falls_short() {
        // No two connected cells can leave a plus sign without cutting it apart.
        let mut plus = shape(1, &[(1, 0), (0, 1), (1, 1), (2, 1), (1, 2)]);
        let piece = plus.split(2, RegionId(2)).unwrap();

        assert_eq!(piece.area(), 1);
        assert_eq!(plus.area(), 4);
        assert!(validation::check_shape(&plus).is_ok());
    }
}
