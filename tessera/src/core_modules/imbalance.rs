// THEORY:
// The `imbalance` module holds the two pure pieces of arithmetic the rebalancer
// is steered by: the ranking that decides *which* region is handled first, and the
// formulas that decide *how much* area a region should gain or shed.
//
// Key architectural principles:
// 1.  **Near-target first**: regions are ordered under-loaded, then settled, then
//     over-loaded, and within each side the region closest to K comes first. Scarce
//     neighbor area is spent where it closes a gap soonest.
// 2.  **Proportional sizing**: area is scaled assuming readings are spread evenly
//     inside a region. Growth divides by the target K while shrinking divides by the
//     current count. The two are not symmetric.
// 3.  **Stateless Utility**: nothing here reads or writes a `Partition` except the
//     sort helper, which only reads counts.

use crate::core_modules::error::PartitionError;
use crate::core_modules::partition::Partition;
use crate::core_modules::region::RegionId;

pub mod imbalance {
    use super::*; // Make the parent's imports available.
    use std::cmp::Ordering;

    /// Where a region's reading count sits relative to the target.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum Load {
        Under,
        At,
        Over,
    }

    pub fn classify(count: u32, target: u32) -> Load {
        match count.cmp(&target) {
            Ordering::Less => Load::Under,
            Ordering::Equal => Load::At,
            Ordering::Greater => Load::Over,
        }
    }

    /// The sort key of a region holding `count` readings: load class first, then the
    /// distance to the target. Equal counts give equal keys.
    pub fn rank_key(count: u32, target: u32) -> (Load, u32) {
        (classify(count, target), count.abs_diff(target))
    }

    /// Total order used for both the per-cycle processing order and the order in
    /// which a growing region raids its neighbors.
    pub fn compare(a: u32, b: u32, target: u32) -> Ordering {
        rank_key(a, target).cmp(&rank_key(b, target))
    }

    /// Sorts `ids` in place by the current reading count of each region. The sort is
    /// stable, so equally ranked regions keep their incoming order. Ids that no longer
    /// resolve sort last.
    pub fn sort_by_rank(ids: &mut [RegionId], partition: &Partition, target: u32) {
        ids.sort_by_key(|id| {
            partition
                .region(*id)
                .map(|r| (false, rank_key(r.reading_count(), target)))
                .unwrap_or((true, (Load::Over, u32::MAX)))
        });
    }

    /// Cells a region of `area` cells should gain when it is `diff` readings short.
    pub fn target_growth(diff: u32, area: usize, target: u32) -> usize {
        // area * (1 + diff / K) - area, truncated.
        (area as u64 * diff as u64 / target as u64) as usize
    }

    /// Cells a region of `area` cells should shed when it holds `excess` readings too
    /// many. The denominator is the current count, not the target.
    pub fn target_shrink(excess: u32, area: usize, target: u32) -> usize {
        let total = excess as u64 + target as u64;
        // area - area * (K / total), truncated and never negative.
        (area as u64 * excess as u64 / total) as usize
    }

    /// Dispatches on the sign of `diff = K - count`.
    pub fn target_change(diff: i64, area: usize, target: u32) -> Result<usize, PartitionError> {
        match diff.cmp(&0) {
            Ordering::Greater => Ok(target_growth(diff as u32, area, target)),
            Ordering::Less => Ok(target_shrink(diff.unsigned_abs() as u32, area, target)),
            Ordering::Equal => Err(PartitionError::SettledTarget { target }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::imbalance::*;
    use super::*;
    use crate::core_modules::grid::Point;

    #[test]
    fn near_target_regions_come_first() {
        let k = 10;
        let mut counts = vec![11, 3, 10, 9, 25, 0, 10];
        counts.sort_by(|a, b| compare(*a, *b, k));
        assert_eq!(counts, vec![9, 3, 0, 10, 10, 11, 25]);
    }

    #[test]
    fn one_below_at_and_one_above_are_ordered() {
        let k = 4;
        let mut counts = vec![k + 1, k, k - 1];
        counts.sort_by(|a, b| compare(*a, *b, k));
        assert_eq!(counts, vec![k - 1, k, k + 1]);
    }

    #[test]
    fn equal_counts_rank_equal() {
        assert_eq!(compare(7, 7, 10), std::cmp::Ordering::Equal);
        assert_eq!(compare(12, 12, 10), std::cmp::Ordering::Equal);
    }

    #[test]
    fn growth_scales_with_target() {
        assert_eq!(target_growth(8, 20, 10), 16);
        assert_eq!(target_growth(1, 5, 10), 0);
        assert_eq!(target_change(8, 20, 10), Ok(16));
    }

    #[test]
    fn shrink_scales_with_current_count() {
        // count 6, K 4: 16 * (1 - 4/6) = 5.33
        assert_eq!(target_shrink(2, 16, 4), 5);
        assert_eq!(target_change(-2, 16, 4), Ok(5));
        // count 20, K 10, area 30: 30 * (1 - 10/20) = 15
        assert_eq!(target_change(-10, 30, 10), Ok(15));
    }

    #[test]
    fn settled_region_has_no_target_change() {
        assert_eq!(
            target_change(0, 12, 10),
            Err(PartitionError::SettledTarget { target: 10 })
        );
    }

    #[test]
    fn sort_by_rank_reads_live_counts() {
        let mut partition = Partition::tiled(6, 2, 2, 2).unwrap();
        // R0: 1 reading, R1: 3 readings, R2: 2 readings. K = 2.
        partition
            .attribute(&[
                Point::new(0, 0),
                Point::new(2, 0),
                Point::new(2, 1),
                Point::new(3, 1),
                Point::new(4, 0),
                Point::new(5, 1),
            ])
            .unwrap();
        let mut ids = partition.regions();
        ids.push(RegionId(99));
        sort_by_rank(&mut ids, &partition, 2);
        assert_eq!(ids, vec![RegionId(0), RegionId(2), RegionId(1), RegionId(99)]);
    }
}
