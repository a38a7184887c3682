// THEORY:
// This file is the main entry point for the `tessera` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (like the `tessera_runner` binary).
//
// The primary goal is to export the `BalancingPipeline` and its associated data
// structures (`BalanceConfig`, `CycleReport`, etc.) as the high-level interface
// for the whole balancing engine. The partition model underneath lives in
// `core_modules` and stays reachable for callers that want to drive the stages
// by hand.

pub mod core_modules;
pub mod pipeline;

pub use core_modules::config::{BalanceConfig, ConfigError, TileSize};
pub use core_modules::error::PartitionError;
pub use core_modules::grid::{GridSize, Point};
pub use core_modules::partition::Partition;
pub use core_modules::region::{Region, RegionId};
pub use pipeline::{BalancingPipeline, CycleReport, PipelineError};
