use anyhow::{bail, Result};
use ratemap::statistics::STATISTICS_BYTES;
use ratemap::{Extent, RateMap};
use wgpu::util::DeviceExt;

use super::constants::{FrameConstants, RateMapParams};
use super::pipeline::{PipelineLayouts, OFFSCREEN_FORMAT};
use super::resources::TargetPlan;

struct OffscreenTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    source: wgpu::BindGroup,
    extent: Extent,
}

impl OffscreenTexture {
    fn new(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        sampler: &wgpu::Sampler,
        label: &str,
        extent: Extent,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let source = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &layouts.source,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        Self {
            _texture: texture,
            view,
            source,
            extent,
        }
    }
}

struct RateMapBinding {
    _buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl RateMapBinding {
    fn new(device: &wgpu::Device, layouts: &PipelineLayouts, label: &str, map: &RateMap) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&RateMapParams::from_map(map)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &layouts.rate_map,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            _buffer: buffer,
            bind_group,
        }
    }
}

/// The target set rebuilt whenever the logical size or zone weights change.
pub(crate) struct RenderTargets {
    logical: OffscreenTexture,
    physical: OffscreenTexture,
    vrr_map: RateMapBinding,
    identity_map: RateMapBinding,
}

/// Borrowed view of whichever target the current frame renders into.
pub(crate) struct ActiveTarget<'a> {
    pub view: &'a wgpu::TextureView,
    pub source: &'a wgpu::BindGroup,
    pub rate_map: &'a wgpu::BindGroup,
    pub extent: Extent,
}

impl RenderTargets {
    pub fn allocate(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        sampler: &wgpu::Sampler,
        plan: &TargetPlan,
    ) -> Result<Self> {
        let max_dimension = device.limits().max_texture_dimension_2d;
        let logical = plan.logical;
        if logical.width > max_dimension || logical.height > max_dimension {
            bail!("GPU max texture dimension is {max_dimension}, requested logical target is {logical}");
        }

        Ok(Self {
            logical: OffscreenTexture::new(device, layouts, sampler, "logical target", logical),
            physical: OffscreenTexture::new(
                device,
                layouts,
                sampler,
                "physical target",
                plan.physical(),
            ),
            vrr_map: RateMapBinding::new(device, layouts, "vrr rate map", &plan.vrr),
            identity_map: RateMapBinding::new(device, layouts, "identity rate map", &plan.identity),
        })
    }

    pub fn physical_extent(&self) -> Extent {
        self.physical.extent
    }

    pub fn active(&self, use_vrr: bool) -> ActiveTarget<'_> {
        let (texture, map) = if use_vrr {
            (&self.physical, &self.vrr_map)
        } else {
            (&self.logical, &self.identity_map)
        };
        ActiveTarget {
            view: &texture.view,
            source: &texture.source,
            rate_map: &map.bind_group,
            extent: texture.extent,
        }
    }
}

/// Per-frame resources, one per in-flight frame. Never reallocated.
pub(crate) struct FrameSlot {
    pub constants: wgpu::Buffer,
    pub counters: wgpu::Buffer,
    /// Host-readable copy of `counters`, filled only when a readback is due.
    pub staging: wgpu::Buffer,
    pub frame_bind_group: wgpu::BindGroup,
    pub counters_bind_group: wgpu::BindGroup,
}

impl FrameSlot {
    pub fn new(device: &wgpu::Device, layouts: &PipelineLayouts, index: usize) -> Self {
        let constants = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("frame constants {index}")),
            size: std::mem::size_of::<FrameConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let counters = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("statistics {index}")),
            size: STATISTICS_BYTES,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("statistics readback {index}")),
            size: STATISTICS_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("frame constants bind group {index}")),
            layout: &layouts.frame,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: constants.as_entire_binding(),
            }],
        });
        let counters_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("statistics bind group {index}")),
            layout: &layouts.counters,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: counters.as_entire_binding(),
            }],
        });
        Self {
            constants,
            counters,
            staging,
            frame_bind_group,
            counters_bind_group,
        }
    }
}
