use std::path::PathBuf;

use clap::{Parser, Subcommand};
use renderer::{GpuPowerPreference, VisualMode};

#[derive(Parser, Debug)]
#[command(
    name = "vrrtest",
    author,
    version,
    about = "Variable-rate rasterization test renderer"
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// TOML configuration file; defaults to `config.toml` in the user config directory.
    #[arg(long, env = "VRRTEST_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Offscreen (logical) resolution, e.g. `1024x1024`.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions)]
    pub logical_size: Option<(u32, u32)>,

    /// Edge length of a statistics tile in physical samples.
    #[arg(long, value_name = "PIXELS")]
    pub block_size: Option<u32>,

    /// Render at full density (physical size equals logical size).
    #[arg(long)]
    pub no_vrr: bool,

    /// Debug overlay: `none`, `uv-delta`, `block` or `row-column`.
    #[arg(long, value_name = "MODE", value_parser = parse_visual_mode)]
    pub visual: Option<VisualMode>,

    /// Logical position echoed back through the debug counters, e.g. `0.5,0.5`.
    #[arg(long, value_name = "U,V", value_parser = parse_debug_uv)]
    pub debug_uv: Option<[f32; 2]>,

    /// Sample density of the outer zones (0 < weight <= 1).
    #[arg(long, value_name = "WEIGHT")]
    pub edge_weight: Option<f32>,

    /// Brightness multiplier for highlights on HDR outputs (>= 1).
    #[arg(long, value_name = "FACTOR")]
    pub edr_headroom: Option<f32>,

    /// Initial window (or headless output) size, e.g. `1280x1280`.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_dimensions)]
    pub window_size: Option<(u32, u32)>,

    /// Present without waiting for vertical blank.
    #[arg(long)]
    pub no_vsync: bool,

    /// GPU power preference: `low` or `high`.
    #[arg(long, value_name = "PREFERENCE")]
    pub power: Option<GpuPowerPreference>,

    /// Render this many frames without a window, print the statistics and exit.
    #[arg(long, value_name = "FRAMES")]
    pub headless: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved configuration as TOML and exit.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Also write the resolved configuration to the configuration file.
    #[arg(long)]
    pub write: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_dimensions(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_visual_mode(value: &str) -> Result<VisualMode, String> {
    value.parse().map_err(|err| format!("{err}"))
}

pub fn parse_debug_uv(value: &str) -> Result<[f32; 2], String> {
    let (u, v) = value
        .split_once(',')
        .ok_or_else(|| "expected U,V".to_string())?;
    let parse = |component: &str| {
        component
            .trim()
            .parse::<f32>()
            .map_err(|_| format!("invalid debug coordinate '{}'", component.trim()))
    };
    Ok([parse(u)?, parse(v)?])
}
