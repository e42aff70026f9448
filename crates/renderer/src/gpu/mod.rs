//! GPU side of the VRR test renderer.
//!
//! - `context` owns the wgpu instance, device and output (window surface or
//!   an owned texture when headless).
//! - `resources` tracks whether the render targets match the configuration
//!   and rebuilds them before a frame is recorded; `targets` holds the
//!   textures and per-frame buffers themselves.
//! - `pipeline` builds the offscreen, statistics and composite pipelines
//!   from the WGSL sources assembled in `compile`.
//! - `pacer` bounds the frames in flight; `timeline` retires them on a
//!   worker thread and resolves statistics readbacks through `readback`.
//! - `state` records each frame and ties the pieces together.

mod constants;
mod context;
mod pacer;
mod pipeline;
mod readback;
mod resources;
mod state;
mod targets;
mod timeline;

pub use pacer::{FramePacer, FramePermit, PacerError, FRAMES_IN_FLIGHT};
pub use readback::StatisticsReport;
pub use state::FrameStatus;

pub(crate) use context::GpuContext;
pub(crate) use state::FrameRenderer;
