use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use ratemap::statistics::{block_grid, STATISTICS_BYTES};
use ratemap::Extent;
use tracing::{debug, error, info};

use crate::types::ConfigHandle;

use super::constants::FrameConstants;
use super::context::GpuContext;
use super::pacer::{FramePacer, FRAMES_IN_FLIGHT};
use super::pipeline::{FramePipelines, PipelineLayouts};
use super::readback::{ExpectedStatistics, StatisticsReport};
use super::resources::{RebuildOutcome, ResourceManager};
use super::targets::{FrameSlot, RenderTargets};
use super::timeline::{FrameEvent, FrameTimeline, InFlightFrame, PendingReadback};

/// Upper bound on how long shutdown waits for in-flight frames.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);
/// Reports kept for [`FrameRenderer::take_reports`]; older ones are dropped.
const MAX_RETAINED_REPORTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { frame: u64 },
    /// The output could not be acquired; nothing was submitted.
    Dropped,
}

/// Records and submits frames: offscreen pass at the configured rate,
/// statistics pass, composite, optional counter copy, present.
pub(crate) struct FrameRenderer {
    context: GpuContext,
    layouts: PipelineLayouts,
    pipelines: FramePipelines,
    resources: ResourceManager<RenderTargets>,
    slots: Vec<FrameSlot>,
    pacer: FramePacer,
    timeline: FrameTimeline,
    config: ConfigHandle,
    started: Instant,
    next_frame: u64,
    reports: Vec<StatisticsReport>,
}

impl FrameRenderer {
    pub fn new(context: GpuContext, config: ConfigHandle) -> Result<Self> {
        let initial = config.snapshot();
        initial
            .validate()
            .context("invalid renderer configuration")?;

        let layouts = PipelineLayouts::new(&context.device);
        let pipelines = FramePipelines::new(&context.device, &layouts, context.output_format);
        let slots = (0..FRAMES_IN_FLIGHT)
            .map(|index| FrameSlot::new(&context.device, &layouts, index))
            .collect();
        let resources = ResourceManager::new(
            initial.logical_extent(),
            initial.zone_weights,
            initial.use_vrr,
        );
        let timeline = FrameTimeline::spawn(context.device.clone())?;

        info!(
            adapter = %context.adapter_info.name,
            backend = ?context.adapter_info.backend,
            output_format = ?context.output_format,
            output = %context.size(),
            "renderer ready"
        );

        Ok(Self {
            context,
            layouts,
            pipelines,
            resources,
            slots,
            pacer: FramePacer::new(FRAMES_IN_FLIGHT),
            timeline,
            config,
            started: Instant::now(),
            next_frame: 0,
            reports: Vec::new(),
        })
    }

    pub fn resize(&mut self, size: Extent) {
        self.context.resize(size);
    }

    /// Ask for a statistics readback on the next presented frame.
    pub fn request_statistics(&mut self) {
        self.resources.request_statistics();
    }

    pub fn render_frame(&mut self) -> Result<FrameStatus> {
        self.collect_events();

        let config = self.config.snapshot();
        config
            .validate()
            .context("invalid renderer configuration")?;
        self.resources
            .configure(config.logical_extent(), config.zone_weights);
        self.resources.set_use_vrr(config.use_vrr);

        let device = &self.context.device;
        let layouts = &self.layouts;
        let sampler = &self.pipelines.sampler;
        if self
            .resources
            .ensure_ready(|plan| RenderTargets::allocate(device, layouts, sampler, plan))?
            == RebuildOutcome::Rebuilt
        {
            debug!(frame = self.next_frame, "new render targets in use");
        }

        let permit = self.pacer.acquire().context("frame pacer closed")?;
        let readback_due = self.resources.take_debug_pending();

        let targets = self
            .resources
            .targets()
            .ok_or_else(|| anyhow!("render targets missing after rebuild"))?;
        let active = targets.active(config.use_vrr);
        let slot = &self.slots[(self.next_frame % FRAMES_IN_FLIGHT as u64) as usize];

        let constants = FrameConstants::new(
            &config,
            targets.physical_extent(),
            self.context.size(),
            self.started.elapsed(),
        );
        self.context
            .queue
            .write_buffer(&slot.constants, 0, bytemuck::bytes_of(&constants));

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame encoder"),
                });
        encoder.clear_buffer(&slot.counters, 0, None);

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("offscreen pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: active.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.offscreen);
            pass.set_bind_group(0, &slot.frame_bind_group, &[]);
            pass.set_bind_group(1, active.rate_map, &[]);
            pass.draw(0..3, 0..1);
        }

        {
            let (groups_x, groups_y) = block_grid(active.extent, config.block_size);
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("statistics pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.statistics);
            pass.set_bind_group(0, &slot.frame_bind_group, &[]);
            pass.set_bind_group(1, active.rate_map, &[]);
            pass.set_bind_group(2, &slot.counters_bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }

        let output = match self.context.acquire_output() {
            Ok(output) => output,
            Err(err) => {
                error!(frame = self.next_frame, error = %err, "failed to acquire output texture; dropping frame");
                drop(encoder);
                drop(permit);
                if readback_due {
                    self.resources.request_statistics();
                }
                self.context.handle_surface_error(&err)?;
                return Ok(FrameStatus::Dropped);
            }
        };

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("composite pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.composite);
            pass.set_bind_group(0, &slot.frame_bind_group, &[]);
            pass.set_bind_group(1, active.rate_map, &[]);
            pass.set_bind_group(2, active.source, &[]);
            pass.draw(0..3, 0..1);
        }

        let readback = readback_due.then(|| {
            encoder.copy_buffer_to_buffer(&slot.counters, 0, &slot.staging, 0, STATISTICS_BYTES);
            PendingReadback {
                staging: slot.staging.clone(),
                expected: ExpectedStatistics {
                    use_vrr: config.use_vrr,
                    logical: config.logical_extent(),
                    active: active.extent,
                    block_size: config.block_size,
                },
            }
        });

        let frame = self.next_frame;
        self.next_frame += 1;
        let submission = self.context.queue.submit(std::iter::once(encoder.finish()));
        self.context
            .queue
            .on_submitted_work_done(self.timeline.completion_callback(frame));
        output.present();

        self.timeline.submit(InFlightFrame {
            frame,
            submission,
            permit,
            readback,
        });
        Ok(FrameStatus::Presented { frame })
    }

    /// Block until every submitted frame has retired and collect its events.
    pub fn wait_idle(&mut self) -> Result<()> {
        self.pacer
            .drain(IDLE_TIMEOUT)
            .context("timed out waiting for in-flight frames")?;
        self.collect_events();
        Ok(())
    }

    pub fn take_reports(&mut self) -> Vec<StatisticsReport> {
        std::mem::take(&mut self.reports)
    }

    fn collect_events(&mut self) {
        for event in self.timeline.drain_events() {
            match event {
                FrameEvent::Retired {
                    statistics: Some(report),
                    ..
                } => {
                    report.log();
                    if self.reports.len() == MAX_RETAINED_REPORTS {
                        self.reports.remove(0);
                    }
                    self.reports.push(report);
                }
                FrameEvent::Retired {
                    frame,
                    statistics: None,
                } => tracing::trace!(frame, "frame retired"),
            }
        }
    }
}
