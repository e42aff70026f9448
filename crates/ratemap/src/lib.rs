//! Non-uniform sampling grids for the VRR test harness.
//!
//! A rate map splits the logical (screen-space) surface into a fixed 4×4
//! grid of zones and gives every zone column/row a density weight. The
//! renderer shades into a smaller *physical* target whose zone extents are
//! the logical extents scaled by those weights:
//!
//! ```text
//!   logical   |  256  |   256   |   256   |  256  |   = 1024
//!   weight       0.25     1.0       1.0     0.25
//!   physical  | 64 |   256   |   256   | 64 |        =  640
//! ```
//!
//! The mapping is piecewise linear per axis, so both directions
//! (logical → physical for compositing, physical → logical for shading and
//! statistics) are cheap to evaluate on the GPU. [`statistics`] mirrors the
//! GPU tile-aggregation pass on the CPU so the counters the renderer reads
//! back can be checked against a reference.

mod map;
pub mod statistics;

pub use map::{
    Axis, AxisMap, Extent, RateMap, RateMapError, ZoneWeights, EDGE_WEIGHT, INTERIOR_WEIGHT,
    SAMPLE_GRANULARITY, ZONE_COUNT,
};
pub use statistics::{aggregate, blocks, BlockRegion, StatisticsSnapshot};
