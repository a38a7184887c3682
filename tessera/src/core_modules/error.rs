//! Error types for partition maintenance.
//!
//! Every variant signals a broken precondition or invariant. None of them is
//! recoverable mid-cycle: callers propagate them and abort the run.

use crate::core_modules::grid::Point;
use crate::core_modules::region::RegionId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    #[error("point {point} lies outside the {width}x{height} grid")]
    OutOfBounds { point: Point, width: u32, height: u32 },

    #[error("region {0} is not part of the partition")]
    UnknownRegion(RegionId),

    #[error("regions {from} and {to} do not share a boundary")]
    NotAdjacent { from: RegionId, to: RegionId },

    #[error("target change requested for a region already holding exactly {target} readings")]
    SettledTarget { target: u32 },

    #[error("cover invariant violated at {point}: {detail}")]
    CoverViolated { point: Point, detail: String },

    #[error("region {0} is not 4-connected")]
    Disconnected(RegionId),

    #[error("region {region} encloses a hole at {point}")]
    Holed { region: RegionId, point: Point },

    #[error("region {region} records {recorded} readings but its cells hold {actual}")]
    CountMismatch {
        region: RegionId,
        recorded: u32,
        actual: u32,
    },

    #[error("region {0} owns no cells")]
    EmptyRegion(RegionId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
