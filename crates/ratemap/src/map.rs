use std::fmt;

use serde::{Deserialize, Serialize};

/// Zones per axis. The topology is fixed; only the weights vary.
pub const ZONE_COUNT: usize = 4;

/// Weight applied to the first and last zone of each axis by default.
pub const EDGE_WEIGHT: f32 = 0.25;

/// Weight applied to interior zones by default (full density).
pub const INTERIOR_WEIGHT: f32 = 1.0;

/// Physical zone extents are rounded up to a multiple of this many samples.
pub const SAMPLE_GRANULARITY: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Horizontal => f.write_str("horizontal"),
            Axis::Vertical => f.write_str("vertical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateMapError {
    #[error("{axis} extent must be non-zero")]
    ZeroExtent { axis: Axis },
    #[error("{axis} extent {extent} is smaller than the zone count ({zones})")]
    TooSmall { axis: Axis, extent: u32, zones: usize },
    #[error("{axis} zone {zone} has weight {weight}; weights must lie in (0, 1]")]
    InvalidWeight { axis: Axis, zone: usize, weight: f32 },
}

/// Width/height pair in pixels (logical) or samples (physical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Per-zone density weights for both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneWeights {
    pub horizontal: [f32; ZONE_COUNT],
    pub vertical: [f32; ZONE_COUNT],
}

impl ZoneWeights {
    /// Cheap periphery, dense centre: `edge` on the outer zones, full density inside.
    pub fn periphery(edge: f32) -> Self {
        let mut axis = [INTERIOR_WEIGHT; ZONE_COUNT];
        axis[0] = edge;
        axis[ZONE_COUNT - 1] = edge;
        Self {
            horizontal: axis,
            vertical: axis,
        }
    }

    /// Full density everywhere; the resulting map is the identity.
    pub fn uniform() -> Self {
        Self {
            horizontal: [INTERIOR_WEIGHT; ZONE_COUNT],
            vertical: [INTERIOR_WEIGHT; ZONE_COUNT],
        }
    }

    pub fn axis(&self, axis: Axis) -> &[f32; ZONE_COUNT] {
        match axis {
            Axis::Horizontal => &self.horizontal,
            Axis::Vertical => &self.vertical,
        }
    }

    pub fn validate(&self) -> Result<(), RateMapError> {
        for axis in [Axis::Horizontal, Axis::Vertical] {
            for (zone, &weight) in self.axis(axis).iter().enumerate() {
                if !weight.is_finite() || weight <= 0.0 || weight > 1.0 {
                    return Err(RateMapError::InvalidWeight { axis, zone, weight });
                }
            }
        }
        Ok(())
    }
}

impl Default for ZoneWeights {
    fn default() -> Self {
        Self::periphery(EDGE_WEIGHT)
    }
}

/// Zone boundaries for one axis, in logical pixels and physical samples.
///
/// Both boundary arrays start at zero and are strictly increasing, so every
/// zone has a non-empty logical and physical extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisMap {
    logical: [u32; ZONE_COUNT + 1],
    physical: [u32; ZONE_COUNT + 1],
}

impl AxisMap {
    fn build(axis: Axis, extent: u32, weights: &[f32; ZONE_COUNT]) -> Result<Self, RateMapError> {
        if extent == 0 {
            return Err(RateMapError::ZeroExtent { axis });
        }
        if (extent as usize) < ZONE_COUNT {
            return Err(RateMapError::TooSmall {
                axis,
                extent,
                zones: ZONE_COUNT,
            });
        }

        let mut logical = [0u32; ZONE_COUNT + 1];
        let mut physical = [0u32; ZONE_COUNT + 1];
        for zone in 0..ZONE_COUNT {
            let weight = weights[zone];
            if !weight.is_finite() || weight <= 0.0 || weight > 1.0 {
                return Err(RateMapError::InvalidWeight { axis, zone, weight });
            }
            logical[zone + 1] =
                ((zone as u64 + 1) * u64::from(extent) / ZONE_COUNT as u64) as u32;
            let zone_extent = logical[zone + 1] - logical[zone];
            physical[zone + 1] = physical[zone] + quantize(zone_extent, weight);
        }

        Ok(Self { logical, physical })
    }

    pub fn logical_extent(&self) -> u32 {
        self.logical[ZONE_COUNT]
    }

    pub fn physical_extent(&self) -> u32 {
        self.physical[ZONE_COUNT]
    }

    pub fn logical_edges(&self) -> &[u32; ZONE_COUNT + 1] {
        &self.logical
    }

    pub fn physical_edges(&self) -> &[u32; ZONE_COUNT + 1] {
        &self.physical
    }

    /// Logical pixel boundary corresponding to physical sample boundary `physical_edge`.
    ///
    /// Integer arithmetic, identical to the statistics shader. The result is
    /// exact at zone boundaries, so `logical_edge(physical_extent())` is the
    /// logical extent.
    pub fn logical_edge(&self, physical_edge: u32) -> u32 {
        let position = physical_edge.min(self.physical_extent());
        let zone = zone_containing(&self.physical, position);
        let (p0, p1) = (self.physical[zone], self.physical[zone + 1]);
        let (l0, l1) = (self.logical[zone], self.logical[zone + 1]);
        let offset = u64::from(position - p0) * u64::from(l1 - l0) / u64::from(p1 - p0);
        l0 + offset as u32
    }

    /// Number of logical pixels represented by physical sample `sample`.
    pub fn sample_span(&self, sample: u32) -> u32 {
        self.logical_edge(sample + 1) - self.logical_edge(sample)
    }

    pub fn physical_to_logical(&self, position: f32) -> f32 {
        let zone = zone_containing_f32(&self.physical, position);
        remap(position, zone, &self.physical, &self.logical)
    }

    pub fn logical_to_physical(&self, position: f32) -> f32 {
        let zone = zone_containing_f32(&self.logical, position);
        remap(position, zone, &self.logical, &self.physical)
    }
}

/// Logical extent → physical extent for one zone.
///
/// `ceil(extent * weight)` rounded up to [`SAMPLE_GRANULARITY`], never
/// below one sample and never above the logical extent.
fn quantize(logical_extent: u32, weight: f32) -> u32 {
    let scaled = (f64::from(logical_extent) * f64::from(weight)).ceil() as u32;
    let rounded = scaled.div_ceil(SAMPLE_GRANULARITY) * SAMPLE_GRANULARITY;
    rounded.max(1).min(logical_extent)
}

fn zone_containing(edges: &[u32; ZONE_COUNT + 1], position: u32) -> usize {
    (1..ZONE_COUNT)
        .rev()
        .find(|&zone| position >= edges[zone])
        .unwrap_or(0)
}

fn zone_containing_f32(edges: &[u32; ZONE_COUNT + 1], position: f32) -> usize {
    (1..ZONE_COUNT)
        .rev()
        .find(|&zone| position >= edges[zone] as f32)
        .unwrap_or(0)
}

fn remap(
    position: f32,
    zone: usize,
    from: &[u32; ZONE_COUNT + 1],
    to: &[u32; ZONE_COUNT + 1],
) -> f32 {
    let (f0, f1) = (from[zone] as f32, from[zone + 1] as f32);
    let (t0, t1) = (to[zone] as f32, to[zone + 1] as f32);
    t0 + (position - f0) * (t1 - t0) / (f1 - f0).max(1.0)
}

/// Logical ↔ physical mapping for a full surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateMap {
    horizontal: AxisMap,
    vertical: AxisMap,
}

impl RateMap {
    pub fn new(logical: Extent, weights: ZoneWeights) -> Result<Self, RateMapError> {
        let horizontal = AxisMap::build(Axis::Horizontal, logical.width, &weights.horizontal)?;
        let vertical = AxisMap::build(Axis::Vertical, logical.height, &weights.vertical)?;
        Ok(Self {
            horizontal,
            vertical,
        })
    }

    /// Map with every weight at 1.0: physical size equals logical size.
    pub fn identity(logical: Extent) -> Result<Self, RateMapError> {
        Self::new(logical, ZoneWeights::uniform())
    }

    pub fn horizontal(&self) -> &AxisMap {
        &self.horizontal
    }

    pub fn vertical(&self) -> &AxisMap {
        &self.vertical
    }

    pub fn logical_size(&self) -> Extent {
        Extent::new(
            self.horizontal.logical_extent(),
            self.vertical.logical_extent(),
        )
    }

    pub fn physical_size(&self) -> Extent {
        Extent::new(
            self.horizontal.physical_extent(),
            self.vertical.physical_extent(),
        )
    }

    pub fn is_identity(&self) -> bool {
        self.logical_size() == self.physical_size()
    }

    /// Normalised logical UV → normalised physical UV (used when compositing).
    pub fn uv_to_physical(&self, uv: [f32; 2]) -> [f32; 2] {
        let logical = self.logical_size();
        let physical = self.physical_size();
        [
            self.horizontal
                .logical_to_physical(uv[0] * logical.width as f32)
                / physical.width as f32,
            self.vertical
                .logical_to_physical(uv[1] * logical.height as f32)
                / physical.height as f32,
        ]
    }

    /// Normalised physical UV → normalised logical UV (used when shading).
    pub fn uv_to_logical(&self, uv: [f32; 2]) -> [f32; 2] {
        let logical = self.logical_size();
        let physical = self.physical_size();
        [
            self.horizontal
                .physical_to_logical(uv[0] * physical.width as f32)
                / logical.width as f32,
            self.vertical
                .physical_to_logical(uv[1] * physical.height as f32)
                / logical.height as f32,
        ]
    }
}
