use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use ratemap::Extent;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::types::{GpuPowerPreference, WindowOptions, MAX_LOGICAL_SIZE};

use super::pacer::FRAMES_IN_FLIGHT;
use super::pipeline::OFFSCREEN_FORMAT;

/// Format of the owned output texture when running without a window.
const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

enum Output {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Texture {
        texture: wgpu::Texture,
    },
}

/// The output texture for one frame. Presenting is a no-op for headless
/// outputs.
pub(crate) struct OutputFrame {
    surface_texture: Option<wgpu::SurfaceTexture>,
    pub view: wgpu::TextureView,
}

impl OutputFrame {
    pub fn present(self) {
        if let Some(texture) = self.surface_texture {
            texture.present();
        }
    }
}

pub(crate) struct GpuContext {
    _instance: wgpu::Instance,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub output_format: wgpu::TextureFormat,
    pub adapter_info: wgpu::AdapterInfo,
    output: Output,
    size: Extent,
}

impl GpuContext {
    pub(crate) fn new<T>(target: &T, size: Extent, options: &WindowOptions) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = create_instance();

        let window_handle = target
            .window_handle()
            .map_err(|err| anyhow!("failed to acquire window handle: {err}"))?;
        let display_handle = target
            .display_handle()
            .map_err(|err| anyhow!("failed to acquire display handle: {err}"))?;

        let surface = unsafe {
            instance.create_surface_unsafe(wgpu::SurfaceTargetUnsafe::RawHandle {
                raw_display_handle: display_handle.as_raw(),
                raw_window_handle: window_handle.as_raw(),
            })
        }
        .context("failed to create rendering surface")?;

        let (adapter, device, queue) = request_device(&instance, Some(&surface), options.power)?;

        let caps = surface.get_capabilities(&adapter);
        let output_format = preferred_surface_format(&caps.formats)
            .ok_or_else(|| anyhow!("surface is not compatible with the selected adapter"))?;
        let present_mode = preferred_present_mode(&caps.present_modes, options.vsync);
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        tracing::debug!(?output_format, ?present_mode, vsync = options.vsync, "configuring surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: output_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: FRAMES_IN_FLIGHT as u32,
        };
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            device,
            queue,
            output_format,
            adapter_info: adapter.get_info(),
            output: Output::Surface { surface, config },
            size,
        })
    }

    /// Context that composites into an owned texture instead of a window.
    pub(crate) fn headless(size: Extent, power: GpuPowerPreference) -> Result<Self> {
        let instance = create_instance();
        let (adapter, device, queue) = request_device(&instance, None, power)?;
        let texture = create_output_texture(&device, size);
        Ok(Self {
            _instance: instance,
            device,
            queue,
            output_format: HEADLESS_FORMAT,
            adapter_info: adapter.get_info(),
            output: Output::Texture { texture },
            size,
        })
    }

    pub(crate) fn size(&self) -> Extent {
        self.size
    }

    pub(crate) fn resize(&mut self, size: Extent) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.size = size;
        match &mut self.output {
            Output::Surface { surface, config } => {
                config.width = size.width;
                config.height = size.height;
                surface.configure(&self.device, config);
            }
            Output::Texture { texture } => {
                *texture = create_output_texture(&self.device, size);
            }
        }
    }

    pub(crate) fn acquire_output(&self) -> Result<OutputFrame, wgpu::SurfaceError> {
        match &self.output {
            Output::Surface { surface, .. } => {
                let texture = surface.get_current_texture()?;
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok(OutputFrame {
                    surface_texture: Some(texture),
                    view,
                })
            }
            Output::Texture { texture } => Ok(OutputFrame {
                surface_texture: None,
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
            }),
        }
    }

    /// Recover from a failed acquire. Only running out of memory is fatal.
    pub(crate) fn handle_surface_error(&mut self, err: &wgpu::SurfaceError) -> Result<()> {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                tracing::warn!(error = %err, "surface lost or outdated; reconfiguring");
                self.resize(self.size);
                Ok(())
            }
            wgpu::SurfaceError::OutOfMemory => Err(anyhow!("surface out of memory")),
            wgpu::SurfaceError::Timeout => {
                tracing::warn!("surface timeout; retrying next frame");
                Ok(())
            }
            other => {
                tracing::warn!(error = %other, "surface error; retrying next frame");
                Ok(())
            }
        }
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
        backend_options: wgpu::BackendOptions::default(),
    })
}

fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
    power: GpuPowerPreference,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: power.to_wgpu(),
        compatible_surface: surface,
        force_fallback_adapter: false,
    }))
    .context("failed to find a suitable GPU adapter")?;

    let info = adapter.get_info();
    tracing::debug!(
        name = %info.name,
        backend = ?info.backend,
        device_type = ?info.device_type,
        "selected GPU adapter"
    );
    check_capabilities(&adapter)?;

    let limits = adapter.limits();
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("vrrtest device"),
        required_features: wgpu::Features::empty(),
        required_limits: limits,
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::default(),
    }))
    .context("failed to create GPU device")?;

    Ok((adapter, device, queue))
}

/// Fail start-up when the adapter cannot run the statistics pass or host the
/// offscreen targets.
fn check_capabilities(adapter: &wgpu::Adapter) -> Result<()> {
    let downlevel = adapter.get_downlevel_capabilities();
    if !downlevel
        .flags
        .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
    {
        bail!("GPU adapter does not support compute shaders");
    }

    let limits = adapter.limits();
    if limits.max_storage_buffers_per_shader_stage < 1 {
        bail!("GPU adapter exposes no storage buffers to compute shaders");
    }
    if limits.max_texture_dimension_2d < MAX_LOGICAL_SIZE {
        bail!(
            "GPU max texture dimension is {}, at least {MAX_LOGICAL_SIZE} is required",
            limits.max_texture_dimension_2d
        );
    }

    let features = adapter.get_texture_format_features(OFFSCREEN_FORMAT);
    let required = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
    if !features.allowed_usages.contains(required)
        || !features
            .flags
            .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
    {
        bail!("{OFFSCREEN_FORMAT:?} cannot be used as a filterable render target");
    }
    Ok(())
}

/// Extended-range float first, then sRGB, then whatever comes first.
fn preferred_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|format| *format == wgpu::TextureFormat::Rgba16Float)
        .or_else(|| formats.iter().copied().find(|format| format.is_srgb()))
        .or_else(|| formats.first().copied())
}

fn preferred_present_mode(modes: &[wgpu::PresentMode], vsync: bool) -> wgpu::PresentMode {
    let find = |wanted: wgpu::PresentMode| modes.iter().copied().find(|mode| *mode == wanted);
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    find(wgpu::PresentMode::Immediate)
        .or_else(|| find(wgpu::PresentMode::Mailbox))
        .unwrap_or(wgpu::PresentMode::Fifo)
}

fn create_output_texture(device: &wgpu::Device, size: Extent) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("headless output"),
        size: wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: HEADLESS_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_format_prefers_extended_range() {
        use wgpu::TextureFormat::*;
        assert_eq!(
            preferred_surface_format(&[Bgra8Unorm, Bgra8UnormSrgb, Rgba16Float]),
            Some(Rgba16Float)
        );
        assert_eq!(
            preferred_surface_format(&[Bgra8Unorm, Bgra8UnormSrgb]),
            Some(Bgra8UnormSrgb)
        );
        assert_eq!(preferred_surface_format(&[Rgb10a2Unorm]), Some(Rgb10a2Unorm));
        assert_eq!(preferred_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_follows_vsync() {
        use wgpu::PresentMode::*;
        assert_eq!(preferred_present_mode(&[Fifo, Immediate], true), Fifo);
        assert_eq!(preferred_present_mode(&[Fifo, Mailbox, Immediate], false), Immediate);
        assert_eq!(preferred_present_mode(&[Fifo, Mailbox], false), Mailbox);
        assert_eq!(preferred_present_mode(&[Fifo], false), Fifo);
    }
}
