use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use ratemap::{Extent, RateMapError, ZoneWeights};

/// Logical (offscreen) sizes must be a multiple of this many pixels.
pub const LOGICAL_SIZE_GRANULARITY: u32 = 16;
pub const MIN_LOGICAL_SIZE: u32 = 256;
pub const MAX_LOGICAL_SIZE: u32 = 4096;
/// Step applied by the interactive size controls.
pub const LOGICAL_SIZE_STEP: u32 = 256;

pub const MIN_BLOCK_SIZE: u32 = 1;
pub const MAX_BLOCK_SIZE: u32 = 256;
pub const DEFAULT_BLOCK_SIZE: u32 = 16;

/// Debug overlay applied on top of the rendered pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisualMode {
    #[default]
    None,
    /// Offset between logical and physical UV when compositing.
    UvDelta,
    /// Checkerboard of statistics tiles.
    Block,
    /// Logical span of every physical row and column.
    RowColumn,
}

impl VisualMode {
    pub const ALL: [VisualMode; 4] = [
        VisualMode::None,
        VisualMode::UvDelta,
        VisualMode::Block,
        VisualMode::RowColumn,
    ];

    /// Value written into the frame constants.
    pub fn as_u32(self) -> u32 {
        match self {
            VisualMode::None => 0,
            VisualMode::UvDelta => 1,
            VisualMode::Block => 2,
            VisualMode::RowColumn => 3,
        }
    }

    pub fn next(self) -> Self {
        let index = Self::ALL
            .iter()
            .position(|mode| *mode == self)
            .unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for VisualMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisualMode::None => f.write_str("none"),
            VisualMode::UvDelta => f.write_str("uv-delta"),
            VisualMode::Block => f.write_str("block"),
            VisualMode::RowColumn => f.write_str("row-column"),
        }
    }
}

impl FromStr for VisualMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(VisualMode::None),
            "uv-delta" | "uvdelta" | "uv_delta" => Ok(VisualMode::UvDelta),
            "block" | "blocks" => Ok(VisualMode::Block),
            "row-column" | "rowcolumn" | "row_column" => Ok(VisualMode::RowColumn),
            _ => Err(ConfigError::UnknownVisualMode(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("block size {0} is outside {}..={}", MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)]
    BlockSize(u32),
    #[error(
        "logical size {width}x{height} must be a multiple of {} within {}..={}",
        LOGICAL_SIZE_GRANULARITY,
        MIN_LOGICAL_SIZE,
        MAX_LOGICAL_SIZE
    )]
    LogicalSize { width: u32, height: u32 },
    #[error("debug input ({u}, {v}) must lie in [0, 1]")]
    DebugInput { u: f32, v: f32 },
    #[error("EDR headroom {0} must be at least 1.0")]
    EdrHeadroom(f32),
    #[error("unknown visualization mode `{0}` (expected none, uv-delta, block or row-column)")]
    UnknownVisualMode(String),
    #[error(transparent)]
    RateMap(#[from] RateMapError),
}

/// Values that drive a single frame.
///
/// The host mutates a shared copy through [`ConfigHandle`]; the renderer
/// takes one snapshot per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererConfig {
    /// Edge length of a statistics tile, in physical samples.
    pub block_size: u32,
    pub use_vrr: bool,
    pub visual_mode: VisualMode,
    /// Offscreen (screen-space) resolution in pixels.
    pub logical_size: (u32, u32),
    /// Normalised logical position echoed back through the debug counters.
    pub debug_uv: [f32; 2],
    pub zone_weights: ZoneWeights,
    /// Brightness multiplier for highlights on HDR-capable outputs.
    pub edr_headroom: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            use_vrr: true,
            visual_mode: VisualMode::None,
            logical_size: (1024, 1024),
            debug_uv: [0.5, 0.5],
            zone_weights: ZoneWeights::default(),
            edr_headroom: 1.0,
        }
    }
}

impl RendererConfig {
    pub fn logical_extent(&self) -> Extent {
        Extent::new(self.logical_size.0, self.logical_size.1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(ConfigError::BlockSize(self.block_size));
        }
        let (width, height) = self.logical_size;
        let valid_edge = |edge: u32| {
            (MIN_LOGICAL_SIZE..=MAX_LOGICAL_SIZE).contains(&edge)
                && edge % LOGICAL_SIZE_GRANULARITY == 0
        };
        if !valid_edge(width) || !valid_edge(height) {
            return Err(ConfigError::LogicalSize { width, height });
        }
        let [u, v] = self.debug_uv;
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return Err(ConfigError::DebugInput { u, v });
        }
        if !self.edr_headroom.is_finite() || self.edr_headroom < 1.0 {
            return Err(ConfigError::EdrHeadroom(self.edr_headroom));
        }
        self.zone_weights.validate()?;
        Ok(())
    }

    pub fn adjust_block_size(&mut self, delta: i32) {
        let next = self.block_size as i64 + i64::from(delta);
        self.block_size = next.clamp(i64::from(MIN_BLOCK_SIZE), i64::from(MAX_BLOCK_SIZE)) as u32;
    }

    /// Grow or shrink both logical edges by `steps * LOGICAL_SIZE_STEP`.
    pub fn adjust_logical_size(&mut self, steps: i32) {
        let adjust = |edge: u32| {
            let next = i64::from(edge) + i64::from(steps) * i64::from(LOGICAL_SIZE_STEP);
            next.clamp(i64::from(MIN_LOGICAL_SIZE), i64::from(MAX_LOGICAL_SIZE)) as u32
        };
        self.logical_size = (adjust(self.logical_size.0), adjust(self.logical_size.1));
    }

    pub fn nudge_debug_uv(&mut self, delta: [f32; 2]) {
        self.debug_uv = [
            (self.debug_uv[0] + delta[0]).clamp(0.0, 1.0),
            (self.debug_uv[1] + delta[1]).clamp(0.0, 1.0),
        ];
    }
}

/// Shared, cloneable access to the live configuration.
///
/// Writers go through [`ConfigHandle::update`]; the frame loop reads a
/// complete copy with [`ConfigHandle::snapshot`], so a frame never sees a
/// partially applied change.
#[derive(Debug, Clone, Default)]
pub struct ConfigHandle {
    inner: Arc<Mutex<RendererConfig>>,
}

impl ConfigHandle {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(config)),
        }
    }

    pub fn snapshot(&self) -> RendererConfig {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update<R>(&self, apply: impl FnOnce(&mut RendererConfig) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

impl GpuPowerPreference {
    pub(crate) fn to_wgpu(self) -> wgpu::PowerPreference {
        match self {
            GpuPowerPreference::Low => wgpu::PowerPreference::LowPower,
            GpuPowerPreference::High => wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl FromStr for GpuPowerPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(GpuPowerPreference::Low),
            "high" => Ok(GpuPowerPreference::High),
            other => Err(format!("unknown GPU power preference `{other}` (expected low or high)")),
        }
    }
}

impl fmt::Display for GpuPowerPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuPowerPreference::Low => f.write_str("low"),
            GpuPowerPreference::High => f.write_str("high"),
        }
    }
}

/// Presentation settings fixed for the lifetime of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOptions {
    /// Initial window size in physical pixels.
    pub surface_size: (u32, u32),
    pub vsync: bool,
    pub power: GpuPowerPreference,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            surface_size: (1280, 1280),
            vsync: true,
            power: GpuPowerPreference::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        RendererConfig::default().validate().unwrap();
    }

    #[test]
    fn visual_mode_cycles_through_all_modes() {
        let mut mode = VisualMode::None;
        let mut seen = Vec::new();
        for _ in 0..VisualMode::ALL.len() {
            seen.push(mode);
            mode = mode.next();
        }
        assert_eq!(mode, VisualMode::None);
        assert_eq!(seen, VisualMode::ALL);
        assert_eq!(VisualMode::RowColumn.as_u32(), 3);
    }

    #[test]
    fn visual_mode_round_trips_through_display() {
        for mode in VisualMode::ALL {
            assert_eq!(mode.to_string().parse::<VisualMode>().unwrap(), mode);
        }
        assert!(matches!(
            "sparkle".parse::<VisualMode>(),
            Err(ConfigError::UnknownVisualMode(_))
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let base = RendererConfig::default();

        let config = RendererConfig {
            block_size: 0,
            ..base
        };
        assert_eq!(config.validate(), Err(ConfigError::BlockSize(0)));

        let config = RendererConfig {
            logical_size: (1000, 1024),
            ..base
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LogicalSize { width: 1000, .. })
        ));

        let config = RendererConfig {
            logical_size: (8192, 1024),
            ..base
        };
        assert!(config.validate().is_err());

        let config = RendererConfig {
            debug_uv: [1.5, 0.0],
            ..base
        };
        assert!(matches!(config.validate(), Err(ConfigError::DebugInput { .. })));

        let config = RendererConfig {
            edr_headroom: 0.5,
            ..base
        };
        assert_eq!(config.validate(), Err(ConfigError::EdrHeadroom(0.5)));

        let config = RendererConfig {
            zone_weights: ZoneWeights::periphery(0.0),
            ..base
        };
        assert!(matches!(config.validate(), Err(ConfigError::RateMap(_))));
    }

    #[test]
    fn interactive_adjustments_stay_in_range() {
        let mut config = RendererConfig::default();
        config.adjust_block_size(-100);
        assert_eq!(config.block_size, MIN_BLOCK_SIZE);
        config.adjust_block_size(1000);
        assert_eq!(config.block_size, MAX_BLOCK_SIZE);

        config.adjust_logical_size(-10);
        assert_eq!(config.logical_size, (MIN_LOGICAL_SIZE, MIN_LOGICAL_SIZE));
        config.adjust_logical_size(1);
        assert_eq!(config.logical_size, (512, 512));
        config.validate().unwrap();

        config.nudge_debug_uv([-2.0, 0.25]);
        assert_eq!(config.debug_uv, [0.0, 0.75]);
    }

    #[test]
    fn handle_snapshots_are_independent_copies() {
        let handle = ConfigHandle::default();
        let before = handle.snapshot();
        let other = handle.clone();
        other.update(|config| {
            config.use_vrr = false;
            config.block_size = 32;
        });
        assert!(before.use_vrr);
        let after = handle.snapshot();
        assert!(!after.use_vrr);
        assert_eq!(after.block_size, 32);
    }
}
