use std::num::NonZeroU64;

use ratemap::statistics::STATISTICS_BYTES;

use crate::compile::{compile_shader, ShaderStage};

use super::constants::{FrameConstants, RateMapParams};

/// Format of both offscreen targets (logical and physical).
pub(crate) const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Bind group layouts shared by every pipeline.
///
/// Group 0 holds the per-frame constants, group 1 the rate map of the active
/// target. Group 2 differs per pipeline: the statistics buffer for the
/// compute pass, the source texture for the composite.
pub(crate) struct PipelineLayouts {
    pub frame: wgpu::BindGroupLayout,
    pub rate_map: wgpu::BindGroupLayout,
    pub counters: wgpu::BindGroupLayout,
    pub source: wgpu::BindGroupLayout,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame constants layout"),
            entries: &[uniform_entry(
                wgpu::ShaderStages::VERTEX_FRAGMENT | wgpu::ShaderStages::COMPUTE,
                std::mem::size_of::<FrameConstants>() as u64,
            )],
        });
        let rate_map = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("rate map layout"),
            entries: &[uniform_entry(
                wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE,
                std::mem::size_of::<RateMapParams>() as u64,
            )],
        });
        let counters = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("statistics layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(STATISTICS_BYTES),
                },
                count: None,
            }],
        });
        let source = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("composite source layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        Self {
            frame,
            rate_map,
            counters,
            source,
        }
    }
}

fn uniform_entry(visibility: wgpu::ShaderStages, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(size),
        },
        count: None,
    }
}

/// The three pipelines recorded every frame.
pub(crate) struct FramePipelines {
    pub offscreen: wgpu::RenderPipeline,
    pub statistics: wgpu::ComputePipeline,
    pub composite: wgpu::RenderPipeline,
    pub sampler: wgpu::Sampler,
}

impl FramePipelines {
    pub fn new(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        output_format: wgpu::TextureFormat,
    ) -> Self {
        let offscreen_module = compile_shader(device, ShaderStage::Offscreen);
        let statistics_module = compile_shader(device, ShaderStage::Statistics);
        let composite_module = compile_shader(device, ShaderStage::Composite);

        let offscreen_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("offscreen pipeline layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.rate_map],
            push_constant_ranges: &[],
        });
        let statistics_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("statistics pipeline layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.rate_map, &layouts.counters],
            push_constant_ranges: &[],
        });
        let composite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("composite pipeline layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.rate_map, &layouts.source],
            push_constant_ranges: &[],
        });

        let offscreen = fullscreen_pipeline(
            device,
            "offscreen pipeline",
            &offscreen_layout,
            &offscreen_module,
            OFFSCREEN_FORMAT,
        );
        let composite = fullscreen_pipeline(
            device,
            "composite pipeline",
            &composite_layout,
            &composite_module,
            output_format,
        );
        let statistics = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("statistics pipeline"),
            layout: Some(&statistics_layout),
            module: &statistics_module,
            entry_point: Some("cs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("composite sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            offscreen,
            statistics,
            composite,
            sampler,
        }
    }
}

fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}
