use std::sync::Arc;

use anyhow::{anyhow, Result};
use ratemap::Extent;
use tracing::{error, info};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::WindowBuilder;

use crate::gpu::{FrameRenderer, FrameStatus, GpuContext};
use crate::types::{ConfigHandle, RendererConfig, WindowOptions};

/// Debug UV change per arrow key press.
const DEBUG_UV_STEP: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyCommand {
    Exit,
    RequestStatistics,
    Updated,
    Ignored,
}

/// Map a key press onto the configuration.
fn apply_key(config: &mut RendererConfig, key: &Key) -> KeyCommand {
    match key {
        Key::Named(NamedKey::Escape) => KeyCommand::Exit,
        Key::Named(NamedKey::ArrowUp) => {
            config.adjust_logical_size(1);
            KeyCommand::Updated
        }
        Key::Named(NamedKey::ArrowDown) => {
            config.adjust_logical_size(-1);
            KeyCommand::Updated
        }
        Key::Named(NamedKey::ArrowLeft) => {
            config.nudge_debug_uv([-DEBUG_UV_STEP, 0.0]);
            KeyCommand::Updated
        }
        Key::Named(NamedKey::ArrowRight) => {
            config.nudge_debug_uv([DEBUG_UV_STEP, 0.0]);
            KeyCommand::Updated
        }
        Key::Character(value) => match value.to_ascii_lowercase().as_str() {
            "v" => {
                config.use_vrr = !config.use_vrr;
                KeyCommand::Updated
            }
            "m" => {
                config.visual_mode = config.visual_mode.next();
                KeyCommand::Updated
            }
            "[" => {
                config.adjust_block_size(-1);
                KeyCommand::Updated
            }
            "]" => {
                config.adjust_block_size(1);
                KeyCommand::Updated
            }
            "s" => KeyCommand::RequestStatistics,
            _ => KeyCommand::Ignored,
        },
        _ => KeyCommand::Ignored,
    }
}

fn log_config(config: &RendererConfig) {
    info!(
        vrr = config.use_vrr,
        visual = %config.visual_mode,
        block = config.block_size,
        logical = %config.logical_extent(),
        debug_u = config.debug_uv[0],
        debug_v = config.debug_uv[1],
        "configuration updated"
    );
}

/// Open the test window and render until it is closed.
pub(crate) fn run_window(config: ConfigHandle, options: WindowOptions) -> Result<()> {
    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let window = WindowBuilder::new()
        .with_title("VRR Test")
        .with_inner_size(PhysicalSize::new(
            options.surface_size.0,
            options.surface_size.1,
        ))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let size = window.inner_size();
    let context = GpuContext::new(
        window.as_ref(),
        Extent::new(size.width, size.height),
        &options,
    )?;
    let mut renderer = FrameRenderer::new(context, config.clone())?;
    log_config(&config.snapshot());

    let mut failure = None;
    let run_result = event_loop.run(|event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                let (command, updated) = config.update(|current| {
                    let command = apply_key(current, &event.logical_key);
                    (command, *current)
                });
                match command {
                    KeyCommand::Exit => elwt.exit(),
                    KeyCommand::RequestStatistics => {
                        info!("statistics readback requested");
                        renderer.request_statistics();
                    }
                    KeyCommand::Updated => log_config(&updated),
                    KeyCommand::Ignored => {}
                }
            }
            WindowEvent::Resized(new_size) => {
                renderer.resize(Extent::new(new_size.width, new_size.height));
            }
            WindowEvent::RedrawRequested => match renderer.render_frame() {
                Ok(FrameStatus::Presented { frame }) => {
                    tracing::trace!(frame, "frame presented");
                }
                Ok(FrameStatus::Dropped) => {}
                Err(err) => {
                    error!(error = %format!("{err:#}"), "rendering failed; exiting");
                    failure = Some(err);
                    elwt.exit();
                }
            },
            _ => {}
        },
        Event::AboutToWait => {
            window.request_redraw();
            elwt.set_control_flow(ControlFlow::Wait);
        }
        Event::LoopExiting => {
            if let Err(err) = renderer.wait_idle() {
                error!(error = %format!("{err:#}"), "failed to drain in-flight frames");
            }
        }
        _ => {}
    });

    if let Some(err) = failure {
        return Err(err);
    }
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use winit::keyboard::SmolStr;

    use super::*;
    use crate::types::VisualMode;

    fn character(value: &str) -> Key {
        Key::Character(SmolStr::new(value))
    }

    #[test]
    fn keys_toggle_and_cycle_settings() {
        let mut config = RendererConfig::default();
        assert_eq!(apply_key(&mut config, &character("v")), KeyCommand::Updated);
        assert!(!config.use_vrr);
        assert_eq!(apply_key(&mut config, &character("V")), KeyCommand::Updated);
        assert!(config.use_vrr);

        apply_key(&mut config, &character("m"));
        assert_eq!(config.visual_mode, VisualMode::UvDelta);
    }

    #[test]
    fn keys_adjust_sizes_and_debug_point() {
        let mut config = RendererConfig::default();
        apply_key(&mut config, &character("]"));
        assert_eq!(config.block_size, 17);
        apply_key(&mut config, &character("["));
        apply_key(&mut config, &character("["));
        assert_eq!(config.block_size, 15);

        apply_key(&mut config, &Key::Named(NamedKey::ArrowUp));
        assert_eq!(config.logical_size, (1280, 1280));
        apply_key(&mut config, &Key::Named(NamedKey::ArrowDown));
        apply_key(&mut config, &Key::Named(NamedKey::ArrowDown));
        assert_eq!(config.logical_size, (768, 768));

        apply_key(&mut config, &Key::Named(NamedKey::ArrowRight));
        assert!((config.debug_uv[0] - 0.55).abs() < 1e-6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn control_keys_do_not_touch_config() {
        let mut config = RendererConfig::default();
        let before = config;
        assert_eq!(
            apply_key(&mut config, &Key::Named(NamedKey::Escape)),
            KeyCommand::Exit
        );
        assert_eq!(
            apply_key(&mut config, &character("s")),
            KeyCommand::RequestStatistics
        );
        assert_eq!(apply_key(&mut config, &character("x")), KeyCommand::Ignored);
        assert_eq!(config, before);
    }
}
