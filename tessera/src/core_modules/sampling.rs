//! Seeded sample sources.
//!
//! Readings are uniform random cells of the grid. `FixedSamples` draws one batch and
//! replays it every cycle, which is how the reference run behaves; `RandomSamples`
//! draws a fresh batch per cycle.

use crate::core_modules::grid::{GridSize, Point};
use crate::pipeline::SampleSource;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn draw(rng: &mut ChaCha8Rng, grid: GridSize, count: usize) -> Vec<Point> {
    (0..count)
        .map(|_| Point::new(rng.gen_range(0..grid.width), rng.gen_range(0..grid.height)))
        .collect()
}

/// The same batch of readings every cycle.
#[derive(Debug, Clone)]
pub struct FixedSamples {
    points: Vec<Point>,
}

impl FixedSamples {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn seeded(grid: GridSize, count: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self::new(draw(&mut rng, grid, count))
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }
}

impl SampleSource for FixedSamples {
    fn samples(&mut self, _cycle: u64) -> Vec<Point> {
        self.points.clone()
    }
}

/// A new batch of readings every cycle, from one seeded stream.
#[derive(Debug, Clone)]
pub struct RandomSamples {
    rng: ChaCha8Rng,
    grid: GridSize,
    count: usize,
}

impl RandomSamples {
    pub fn seeded(grid: GridSize, count: usize, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            grid,
            count,
        }
    }
}

impl SampleSource for RandomSamples {
    fn samples(&mut self, _cycle: u64) -> Vec<Point> {
        draw(&mut self.rng, self.grid, self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_samples_repeat() {
        let grid = GridSize::new(50, 50);
        let mut source = FixedSamples::seeded(grid, 100, 10);
        let first = source.samples(1);
        assert_eq!(first.len(), 100);
        assert!(first.iter().all(|p| grid.contains(*p)));
        assert_eq!(source.samples(2), first);
    }

    #[test]
    fn same_seed_same_points() {
        let grid = GridSize::new(8, 3);
        let a = FixedSamples::seeded(grid, 20, 7);
        let b = FixedSamples::seeded(grid, 20, 7);
        assert_eq!(a.points(), b.points());
    }

    #[test]
    fn random_samples_change_between_cycles() {
        let grid = GridSize::new(50, 50);
        let mut source = RandomSamples::seeded(grid, 30, 1);
        let first = source.samples(1);
        let second = source.samples(2);
        assert_eq!(second.len(), 30);
        assert!(second.iter().all(|p| grid.contains(*p)));
        assert_ne!(first, second);
    }
}
