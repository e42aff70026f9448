use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use ratemap::{Extent, RateMap, ZONE_COUNT};

use crate::types::RendererConfig;

/// Per-frame constant block. Layout must match `FrameConstants` in
/// `shaders/common.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct FrameConstants {
    pub logical_size: [u32; 2],
    /// Extent of the target the offscreen pass renders into this frame.
    /// Equal to `logical_size` when VRR is off.
    pub physical_size: [u32; 2],
    pub block_size: u32,
    pub visual_mode: u32,
    pub debug_uv: [f32; 2],
    pub time: f32,
    pub edr_headroom: f32,
    /// Output width / height, used to letterbox the composite.
    pub view_aspect: f32,
    pub use_vrr: u32,
}

impl FrameConstants {
    pub fn new(
        config: &RendererConfig,
        physical: Extent,
        output: Extent,
        elapsed: Duration,
    ) -> Self {
        let logical = config.logical_extent();
        let active = if config.use_vrr { physical } else { logical };
        Self {
            logical_size: [logical.width, logical.height],
            physical_size: [active.width, active.height],
            block_size: config.block_size.max(1),
            visual_mode: config.visual_mode.as_u32(),
            debug_uv: config.debug_uv,
            time: elapsed.as_secs_f32(),
            edr_headroom: config.edr_headroom,
            view_aspect: output.width.max(1) as f32 / output.height.max(1) as f32,
            use_vrr: u32::from(config.use_vrr),
        }
    }

    pub fn physical_extent(&self) -> Extent {
        Extent::new(self.physical_size[0], self.physical_size[1])
    }
}

/// Zone boundaries for both axes, uploaded once per target rebuild.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct RateMapParams {
    pub logical_x: [[u32; 4]; 2],
    pub logical_y: [[u32; 4]; 2],
    pub physical_x: [[u32; 4]; 2],
    pub physical_y: [[u32; 4]; 2],
}

impl RateMapParams {
    pub fn from_map(map: &RateMap) -> Self {
        Self {
            logical_x: pack(map.horizontal().logical_edges()),
            logical_y: pack(map.vertical().logical_edges()),
            physical_x: pack(map.horizontal().physical_edges()),
            physical_y: pack(map.vertical().physical_edges()),
        }
    }
}

fn pack(edges: &[u32; ZONE_COUNT + 1]) -> [[u32; 4]; 2] {
    let mut packed = [[0u32; 4]; 2];
    for (index, edge) in edges.iter().enumerate() {
        packed[index / 4][index % 4] = *edge;
    }
    packed
}

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};

    use ratemap::ZoneWeights;

    use super::*;

    #[test]
    fn frame_constants_match_wgsl_layout() {
        assert_eq!(size_of::<FrameConstants>(), 48);
        assert_eq!(offset_of!(FrameConstants, physical_size), 8);
        assert_eq!(offset_of!(FrameConstants, block_size), 16);
        assert_eq!(offset_of!(FrameConstants, visual_mode), 20);
        assert_eq!(offset_of!(FrameConstants, debug_uv), 24);
        assert_eq!(offset_of!(FrameConstants, time), 32);
        assert_eq!(offset_of!(FrameConstants, edr_headroom), 36);
        assert_eq!(offset_of!(FrameConstants, view_aspect), 40);
        assert_eq!(offset_of!(FrameConstants, use_vrr), 44);
        assert_eq!(size_of::<RateMapParams>(), 128);
    }

    #[test]
    fn physical_size_follows_vrr_flag() {
        let physical = Extent::new(640, 640);
        let output = Extent::new(1600, 800);
        let mut config = RendererConfig::default();

        let constants = FrameConstants::new(&config, physical, output, Duration::ZERO);
        assert_eq!(constants.physical_extent(), physical);
        assert_eq!(constants.use_vrr, 1);
        assert_eq!(constants.view_aspect, 2.0);

        config.use_vrr = false;
        let constants = FrameConstants::new(&config, physical, output, Duration::from_secs(2));
        assert_eq!(constants.physical_extent(), Extent::new(1024, 1024));
        assert_eq!(constants.physical_size, constants.logical_size);
        assert_eq!(constants.use_vrr, 0);
        assert_eq!(constants.time, 2.0);
    }

    #[test]
    fn rate_map_params_pack_five_edges_per_axis() {
        let map = RateMap::new(Extent::new(1024, 512), ZoneWeights::default()).unwrap();
        let params = RateMapParams::from_map(&map);
        assert_eq!(params.logical_x, [[0, 256, 512, 768], [1024, 0, 0, 0]]);
        assert_eq!(params.physical_x, [[0, 64, 320, 576], [640, 0, 0, 0]]);
        assert_eq!(params.logical_y[1][0], 512);
    }
}
