// THEORY:
// The `validation` module re-derives every partition invariant from scratch, without
// trusting the incremental simple-point machinery that maintains them. It is what the
// partition runs after a split, what the pipeline runs after each cycle in debug
// builds, and what the test-suite leans on.

use crate::core_modules::error::PartitionError;
use crate::core_modules::grid::{Point, RING};
use crate::core_modules::partition::Partition;
use crate::core_modules::region::{Region, RegionId};
use std::collections::VecDeque;

/// Checks that `region` is non-empty, 4-connected and encloses no hole.
pub fn check_shape(region: &Region) -> Result<(), PartitionError> {
    let cells = region.cells();
    let Some(&first) = cells.first() else {
        return Err(PartitionError::EmptyRegion(region.id()));
    };

    // --- Connectivity ---
    let mut seen = std::collections::BTreeSet::from([first]);
    let mut queue = VecDeque::from([first]);
    while let Some(p) = queue.pop_front() {
        for q in p.neighbors4() {
            if cells.contains(&q) && seen.insert(q) {
                queue.push_back(q);
            }
        }
    }
    if seen.len() != cells.len() {
        return Err(PartitionError::Disconnected(region.id()));
    }

    // --- Holes ---
    // Flood the background (8-connected) from outside the bounding box, padded by one
    // cell on every side. Any background cell the flood cannot reach is enclosed.
    let Some((min, max)) = region.bounding_box() else {
        return Ok(());
    };
    let (x0, y0) = (min.x as i64 - 1, min.y as i64 - 1);
    let w = (max.x - min.x) as i64 + 3;
    let h = (max.y - min.y) as i64 + 3;
    let local = |x: i64, y: i64| ((y - y0) * w + (x - x0)) as usize;
    let is_member = |x: i64, y: i64| {
        x >= 0 && y >= 0 && cells.contains(&Point::new(x as u32, y as u32))
    };

    let mut outside = vec![false; (w * h) as usize];
    let mut queue = VecDeque::from([(x0, y0)]);
    outside[local(x0, y0)] = true;
    while let Some((x, y)) = queue.pop_front() {
        for (dx, dy) in RING {
            let (nx, ny) = (x + dx as i64, y + dy as i64);
            if nx < x0 || ny < y0 || nx >= x0 + w || ny >= y0 + h {
                continue;
            }
            if !outside[local(nx, ny)] && !is_member(nx, ny) {
                outside[local(nx, ny)] = true;
                queue.push_back((nx, ny));
            }
        }
    }

    for y in min.y..=max.y {
        for x in min.x..=max.x {
            let (lx, ly) = (x as i64, y as i64);
            if !is_member(lx, ly) && !outside[local(lx, ly)] {
                return Err(PartitionError::Holed {
                    region: region.id(),
                    point: Point::new(x, y),
                });
            }
        }
    }

    Ok(())
}

/// Checks the cover invariant: every cell is owned by exactly one live region, and the
/// owner lookup agrees with the regions' own cell sets.
pub fn check_cover(partition: &Partition) -> Result<(), PartitionError> {
    let grid = partition.grid();
    let mut claimed = 0usize;

    for region in partition.iter() {
        for &p in region.cells() {
            if !grid.contains(p) {
                return Err(PartitionError::CoverViolated {
                    point: p,
                    detail: format!("{} claims a cell outside the grid", region.id()),
                });
            }
            match partition.owner_of(p) {
                Some(owner) if owner == region.id() => claimed += 1,
                Some(owner) => {
                    return Err(PartitionError::CoverViolated {
                        point: p,
                        detail: format!("claimed by {} but owned by {}", region.id(), owner),
                    });
                }
                None => unreachable!("owner lookup covers every in-grid cell"),
            }
        }
    }

    if claimed != grid.cell_count() {
        let orphan = grid
            .points()
            .find(|&p| {
                partition
                    .owner_of(p)
                    .and_then(|id| partition.region(id))
                    .is_none_or(|r| !r.contains(p))
            })
            .unwrap_or(Point::new(0, 0));
        return Err(PartitionError::CoverViolated {
            point: orphan,
            detail: format!("{claimed} of {} cells are claimed", grid.cell_count()),
        });
    }

    Ok(())
}

/// Checks the cover invariant restricted to two regions, as re-established after a split.
pub fn check_pair(partition: &Partition, a: RegionId, b: RegionId) -> Result<(), PartitionError> {
    let first = partition.region(a).ok_or(PartitionError::UnknownRegion(a))?;
    let second = partition.region(b).ok_or(PartitionError::UnknownRegion(b))?;

    if let Some(&p) = first.cells().intersection(second.cells()).next() {
        return Err(PartitionError::CoverViolated {
            point: p,
            detail: format!("shared by {a} and {b}"),
        });
    }
    for region in [first, second] {
        if let Some(&p) = region
            .cells()
            .iter()
            .find(|&&p| partition.owner_of(p) != Some(region.id()))
        {
            return Err(PartitionError::CoverViolated {
                point: p,
                detail: format!("{} lost the owner lookup for its cell", region.id()),
            });
        }
        check_shape(region)?;
    }
    Ok(())
}

/// Checks that every region's reading count matches the tallies of its cells.
pub fn check_counts(partition: &Partition) -> Result<(), PartitionError> {
    for region in partition.iter() {
        let actual: u32 = region.cells().iter().map(|&p| partition.readings_at(p)).sum();
        if actual != region.reading_count() {
            return Err(PartitionError::CountMismatch {
                region: region.id(),
                recorded: region.reading_count(),
                actual,
            });
        }
    }
    Ok(())
}

/// Runs every invariant check.
pub fn check_invariants(partition: &Partition) -> Result<(), PartitionError> {
    check_cover(partition)?;
    for region in partition.iter() {
        check_shape(region)?;
    }
    check_counts(partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn region(points: &[(u32, u32)]) -> Region {
        let cells: BTreeSet<Point> = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
        Region::new(RegionId(1), cells)
    }

    #[test]
    fn accepts_a_rectangle() {
        let r = region(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert!(check_shape(&r).is_ok());
    }

    #[test]
    fn rejects_an_empty_region() {
        let r = region(&[]);
        assert_eq!(check_shape(&r), Err(PartitionError::EmptyRegion(RegionId(1))));
    }

    #[test]
    fn rejects_diagonal_only_contact() {
        let r = region(&[(0, 0), (1, 1)]);
        assert_eq!(check_shape(&r), Err(PartitionError::Disconnected(RegionId(1))));
    }

    #[test]
    fn rejects_a_ring() {
        let r = region(&[(0, 0), (1, 0), (2, 0), (0, 1), (2, 1), (0, 2), (1, 2), (2, 2)]);
        assert_eq!(
            check_shape(&r),
            Err(PartitionError::Holed {
                region: RegionId(1),
                point: Point::new(1, 1)
            })
        );
    }

    #[test]
    fn diagonal_gap_is_not_a_hole() {
        // (1, 1) escapes through the missing corner (2, 2).
        let r = region(&[(0, 0), (1, 0), (2, 0), (0, 1), (2, 1), (0, 2), (1, 2)]);
        assert!(check_shape(&r).is_ok());
    }
}
