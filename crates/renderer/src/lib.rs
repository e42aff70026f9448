//! Variable-rate rasterization test renderer.
//!
//! A test pattern is rendered into an offscreen target whose sample density
//! falls off towards the edges (see the `ratemap` crate), composited back to
//! full resolution and presented. A compute pass counts every physical
//! sample per tile so the CPU can check the counts against the configured
//! sizes.
//!
//! ```text
//!   vrrtest CLI ──▶ RendererConfig ──▶ ConfigHandle (shared, snapshotted per frame)
//!                                           │
//!   Renderer::run ──▶ winit event loop ──▶ FrameRenderer::render_frame
//!                                           │
//!        clear counters ─▶ offscreen pass ─▶ statistics pass ─▶ composite
//!                                           │
//!                     optional counter copy ─▶ present ─▶ retire worker
//!                                                            │
//!                                      StatisticsReport ◀─────┘
//! ```
//!
//! `Renderer::run_headless` drives the same frame path against an owned
//! texture and returns the reports it collected; `Renderer::headless` does
//! the same one frame at a time.

mod compile;
mod gpu;
mod types;
mod window;

use anyhow::{Context, Result};
use ratemap::Extent;
use tracing::{info, warn};

pub use gpu::{FramePacer, FramePermit, FrameStatus, PacerError, StatisticsReport, FRAMES_IN_FLIGHT};
pub use types::{
    ConfigError, ConfigHandle, GpuPowerPreference, RendererConfig, VisualMode, WindowOptions,
    DEFAULT_BLOCK_SIZE, LOGICAL_SIZE_GRANULARITY, LOGICAL_SIZE_STEP, MAX_BLOCK_SIZE,
    MAX_LOGICAL_SIZE, MIN_BLOCK_SIZE, MIN_LOGICAL_SIZE,
};

use gpu::{FrameRenderer, GpuContext};

/// Entry point owning the live configuration and presentation options.
pub struct Renderer {
    config: ConfigHandle,
    options: WindowOptions,
}

impl Renderer {
    pub fn new(config: ConfigHandle, options: WindowOptions) -> Self {
        Self { config, options }
    }

    /// Handle for changing the configuration while the renderer runs.
    pub fn config(&self) -> ConfigHandle {
        self.config.clone()
    }

    /// Open the test window and block until it is closed.
    pub fn run(&self) -> Result<()> {
        self.config
            .snapshot()
            .validate()
            .context("invalid renderer configuration")?;
        window::run_window(self.config.clone(), self.options)
    }

    /// Render `frames` frames without a window and return the statistics
    /// reports they produced.
    ///
    /// Statistics are read back on the first frame and again on the last
    /// one, plus after any configuration change made through
    /// [`Renderer::config`] in between.
    pub fn run_headless(&self, frames: u32) -> Result<Vec<StatisticsReport>> {
        let mut session = self.headless()?;
        for index in 0..frames {
            if index + 1 == frames && index > 0 {
                session.request_statistics();
            }
            session.render_frame()?;
        }
        session.finish()
    }

    /// Start a windowless session rendering into a texture of
    /// `WindowOptions::surface_size`, driven one frame at a time.
    pub fn headless(&self) -> Result<HeadlessSession> {
        self.config
            .snapshot()
            .validate()
            .context("invalid renderer configuration")?;
        let (width, height) = self.options.surface_size;
        let context = GpuContext::headless(Extent::new(width, height), self.options.power)?;
        Ok(HeadlessSession {
            renderer: FrameRenderer::new(context, self.config.clone())?,
            rendered: 0,
            presented: 0,
        })
    }
}

/// Frame-by-frame headless rendering. Configuration changes made through
/// [`Renderer::config`] between frames apply to the next one.
pub struct HeadlessSession {
    renderer: FrameRenderer,
    rendered: u32,
    presented: u32,
}

impl HeadlessSession {
    pub fn render_frame(&mut self) -> Result<FrameStatus> {
        let status = self.renderer.render_frame()?;
        match status {
            FrameStatus::Presented { .. } => self.presented += 1,
            FrameStatus::Dropped => warn!(index = self.rendered, "headless frame dropped"),
        }
        self.rendered += 1;
        Ok(status)
    }

    /// Read the statistics of the next rendered frame back.
    pub fn request_statistics(&mut self) {
        self.renderer.request_statistics();
    }

    /// Wait for every frame to retire and return the collected reports.
    pub fn finish(mut self) -> Result<Vec<StatisticsReport>> {
        self.renderer.wait_idle()?;
        let reports = self.renderer.take_reports();
        info!(
            frames = self.rendered,
            presented = self.presented,
            reports = reports.len(),
            "headless run finished"
        );
        Ok(reports)
    }
}
