// Rendering of a partition to PNG, one image per cycle.
//
// Each grid cell becomes a `scale x scale` block. Fill color encodes load (blue
// under the target, green at it, red above it) with a per-region shade so that
// neighbors in the same state stay distinguishable. Region borders are drawn dark
// and cells holding readings get a white dot.

use crate::core_modules::imbalance::imbalance::{self, Load};
use crate::core_modules::partition::Partition;
use crate::core_modules::region::RegionId;
use crate::pipeline::{CycleObserver, ObserverError};
use std::path::{Path, PathBuf};

pub mod image_helper {
    use super::*;
    use image::{ImageEncoder, Rgba, RgbaImage};

    const BORDER: Rgba<u8> = Rgba([20, 20, 20, 255]);
    const READING: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[derive(Debug, thiserror::Error)]
    pub enum RenderError {
        #[error("failed to create {path:?}: {source}")]
        Io {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        #[error("failed to encode {path:?}: {source}")]
        Encode {
            path: PathBuf,
            #[source]
            source: image::ImageError,
        },
    }

    /// `cycle001.png`, `cycle042.png`, `cycle1234.png`.
    pub fn cycle_file_name(cycle: u64) -> String {
        format!("cycle{cycle:03}.png")
    }

    /// Fill color of a region holding `count` readings.
    pub fn region_color(id: RegionId, count: u32, target: u32) -> Rgba<u8> {
        // Cheap integer hash so adjacent ids get visibly different shades.
        let shade = (id.0.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 61) as u8 * 8;
        let strong = 160u8.saturating_add(shade);
        let weak = 40u8.saturating_add(shade / 2);
        match imbalance::classify(count, target) {
            Load::Under => Rgba([weak, weak, strong, 255]),
            Load::At => Rgba([weak, strong, weak, 255]),
            Load::Over => Rgba([strong, weak, weak, 255]),
        }
    }

    /// Draws `partition` with every cell scaled to `scale` pixels.
    pub fn render(partition: &Partition, target: u32, scale: u32) -> RgbaImage {
        let scale = scale.max(1);
        let grid = partition.grid();
        let mut image = RgbaImage::new(grid.width * scale, grid.height * scale);

        for region in partition.iter() {
            let fill = region_color(region.id(), region.reading_count(), target);
            for &cell in region.cells() {
                let owner = region.id();
                // A side is a border if the cell across it belongs to someone else.
                let differs = |dx: i32, dy: i32| {
                    cell.offset(dx, dy)
                        .and_then(|q| partition.owner_of(q))
                        .is_some_and(|other| other != owner)
                };
                let (east, north, west, south) =
                    (differs(1, 0), differs(0, -1), differs(-1, 0), differs(0, 1));

                for dy in 0..scale {
                    for dx in 0..scale {
                        let on_border = scale >= 3
                            && ((dx == scale - 1 && east)
                                || (dy == 0 && north)
                                || (dx == 0 && west)
                                || (dy == scale - 1 && south));
                        let color = if on_border { BORDER } else { fill };
                        image.put_pixel(cell.x * scale + dx, cell.y * scale + dy, color);
                    }
                }

                if partition.readings_at(cell) > 0 {
                    let center = scale / 2;
                    image.put_pixel(cell.x * scale + center, cell.y * scale + center, READING);
                }
            }
        }

        image
    }

    /// Writes `image` as a PNG file.
    pub fn save(path: &Path, image: &RgbaImage) -> Result<(), RenderError> {
        let output = std::fs::File::create(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let encoder = image::codecs::png::PngEncoder::new(std::io::BufWriter::new(output));

        encoder
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|source| RenderError::Encode {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Observer writing one `cycleNNN.png` per cycle into a directory.
    #[derive(Debug, Clone)]
    pub struct PngWriter {
        dir: PathBuf,
        target: u32,
        scale: u32,
    }

    impl PngWriter {
        /// Creates the output directory if needed.
        pub fn new(dir: impl Into<PathBuf>, target: u32, scale: u32) -> Result<Self, RenderError> {
            let dir = dir.into();
            std::fs::create_dir_all(&dir).map_err(|source| RenderError::Io {
                path: dir.clone(),
                source,
            })?;
            Ok(Self { dir, target, scale })
        }

        pub fn path_for(&self, cycle: u64) -> PathBuf {
            self.dir.join(cycle_file_name(cycle))
        }
    }

    impl CycleObserver for PngWriter {
        fn observe(&mut self, cycle: u64, partition: &Partition) -> Result<(), ObserverError> {
            let image = render(partition, self.target, self.scale);
            save(&self.path_for(cycle), &image)?;
            Ok(())
        }
    }
}
