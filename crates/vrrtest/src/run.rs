use anyhow::{bail, Result};
use renderer::{ConfigHandle, Renderer, StatisticsReport};
use tracing_subscriber::EnvFilter;

use crate::cli::{ConfigCommand, RunArgs};
use crate::settings::{self, FileConfig, Settings};

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub fn run(args: RunArgs) -> Result<()> {
    let settings = settings::resolve(&args)?;
    log_settings(&settings);

    let renderer = Renderer::new(ConfigHandle::new(settings.renderer), settings.window);
    match args.headless {
        Some(frames) => run_headless(&renderer, frames),
        None => renderer.run(),
    }
}

pub fn show_config(args: &RunArgs, command: ConfigCommand) -> Result<()> {
    let settings = settings::resolve(args)?;
    let file = FileConfig::from_settings(&settings);
    if command.write {
        let path = match &settings.source {
            Some(path) => path.clone(),
            None => settings::default_config_path()?,
        };
        file.persist(&path)?;
        tracing::info!(path = %path.display(), "configuration written");
    }
    print!("{}", toml::to_string_pretty(&file)?);
    Ok(())
}

fn log_settings(settings: &Settings) {
    let config = &settings.renderer;
    tracing::info!(
        source = %settings
            .source
            .as_deref()
            .map_or_else(|| "defaults".to_string(), |path| path.display().to_string()),
        vrr = config.use_vrr,
        visual = %config.visual_mode,
        block = config.block_size,
        logical = %config.logical_extent(),
        window = ?settings.window.surface_size,
        vsync = settings.window.vsync,
        power = %settings.window.power,
        "starting vrrtest"
    );
}

fn run_headless(renderer: &Renderer, frames: u32) -> Result<()> {
    if frames == 0 {
        bail!("--headless needs at least one frame");
    }
    let reports = renderer.run_headless(frames)?;
    for report in &reports {
        println!("{}", describe(report));
    }

    let inconsistent = reports.iter().filter(|report| !report.is_consistent()).count();
    if inconsistent > 0 {
        bail!(
            "{inconsistent} of {} statistics reports did not match the configured sizes",
            reports.len()
        );
    }
    Ok(())
}

fn describe(report: &StatisticsReport) -> String {
    format!(
        "frame {:>5} vrr={:<5} block={:<3} screen={} ({} px) physical={} ({} px) debug=({:.3}, {:.3}) {}",
        report.frame,
        report.use_vrr,
        report.block_size,
        report.deduced_screen,
        report.aggregated_screen_pixels,
        report.deduced_physical,
        report.aggregated_physical_pixels,
        report.debug[0],
        report.debug[1],
        if report.is_consistent() { "ok" } else { "MISMATCH" }
    )
}
