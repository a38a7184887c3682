// THEORY:
// The `grid` module is the geometric ground floor of the partitioning engine.
// Everything above it (regions, the partition, the rebalancer) speaks in terms of
// `Point`s on a fixed `width x height` lattice and never does raw index math itself.
//
// Key architectural principles:
// 1.  **Row-major addressing**: `GridSize` owns the conversion between a `Point` and
//     its flat index, so the partition can keep dense `Vec` lookups (owner, tallies)
//     without every caller re-deriving `y * width + x`.
// 2.  **Two connectivities**: regions are 4-connected (edge neighbors only), while
//     the space *around* a region is judged with 8-connectivity. This is the classic
//     (4, 8) pairing from digital topology, and it is what makes "hole-free" well
//     defined on a square lattice.
// 3.  **Local topology**: `connectivity_number` decides from a single 3x3 window
//     whether a cell can join or leave a region without splitting it or punching a
//     hole. Area transfers and splits are built from repeated applications of this
//     one test, so a region's shape invariants never need a global re-scan mid-edit.

use std::fmt;

/// Offsets of the 8-neighborhood, counter-clockwise starting east (y grows downward).
/// Even indices are the 4-neighbors.
pub const RING: [(i32, i32); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A single cell of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// The cell at `(x + dx, y + dy)`, or `None` if that would leave the first quadrant.
    /// The upper bounds are not checked here; membership lookups reject those cells.
    pub fn offset(self, dx: i32, dy: i32) -> Option<Point> {
        Some(Point {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }

    /// The (up to) four edge neighbors of this cell.
    pub fn neighbors4(self) -> impl Iterator<Item = Point> {
        RING.iter()
            .step_by(2)
            .filter_map(move |&(dx, dy)| self.offset(dx, dy))
    }

    pub fn manhattan(self, other: Point) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The dimensions of the grid being partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x < self.width && p.y < self.height
    }

    /// Row-major index of `p`. The caller must have checked `contains(p)`.
    pub fn index(&self, p: Point) -> usize {
        p.y as usize * self.width as usize + p.x as usize
    }

    pub fn point(&self, index: usize) -> Point {
        let width = self.width as usize;
        Point::new((index % width) as u32, (index / width) as u32)
    }

    /// Edge neighbors of `p` that lie inside the grid.
    pub fn neighbors4(&self, p: Point) -> impl Iterator<Item = Point> + '_ {
        p.neighbors4().filter(move |q| self.contains(*q))
    }

    /// Every cell of the grid in row-major order.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.cell_count()).map(move |i| self.point(i))
    }
}

/// Yokoi's connectivity number of `p` for a 4-connected foreground.
///
/// `member` reports whether a cell belongs to the foreground; `p` itself is ignored.
/// A value of 1 means `p` is a *simple point*: toggling its membership changes
/// neither the number of 4-connected components of the foreground nor the number of
/// holes (8-connected background components) it encloses. 0 means `p` is either
/// isolated or fully surrounded, and 2 or more means `p` bridges separate parts.
pub fn connectivity_number<F>(p: Point, member: F) -> u8
where
    F: Fn(Point) -> bool,
{
    let ring: [bool; 8] = std::array::from_fn(|k| {
        let (dx, dy) = RING[k];
        p.offset(dx, dy).is_some_and(&member)
    });

    (0..8)
        .step_by(2)
        .map(|k| u8::from(ring[k]) - u8::from(ring[k] && ring[k + 1] && ring[(k + 2) % 8]))
        .sum()
}

/// Whether `p` can join or leave the foreground described by `member` without
/// changing its topology.
pub fn is_simple<F>(p: Point, member: F) -> bool
where
    F: Fn(Point) -> bool,
{
    connectivity_number(p, member) == 1
}
