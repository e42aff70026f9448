//! Layered configuration: built-in defaults, then the TOML file, then
//! command-line flags. The merged result is validated once before start-up.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use directories_next::ProjectDirs;
use ratemap::ZoneWeights;
use renderer::{GpuPowerPreference, RendererConfig, VisualMode, WindowOptions};
use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;

pub const ENV_CONFIG_DIR: &str = "VRRTEST_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "config.toml";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "vrrtest";
const APPLICATION: &str = "vrrtest";

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub renderer: RendererSection,
    pub window: WindowSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererSection {
    pub block_size: Option<u32>,
    pub vrr: Option<bool>,
    pub visual_mode: Option<String>,
    pub logical_size: Option<[u32; 2]>,
    pub debug_uv: Option<[f32; 2]>,
    /// Shorthand for periphery weights; ignored when `zone_weights` is set.
    pub edge_weight: Option<f32>,
    pub edr_headroom: Option<f32>,
    pub zone_weights: Option<ZoneWeights>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowSection {
    pub size: Option<[u32; 2]>,
    pub vsync: Option<bool>,
    pub power: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file at {}", path.display()))
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("failed to prepare directory for config file at {}", dir.display())
            })?;
        }
        let serialized =
            toml::to_string_pretty(self).context("failed to serialize configuration to TOML")?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write config file to {}", path.display()))
    }

    /// Fully populated file describing `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let config = &settings.renderer;
        let window = &settings.window;
        Self {
            renderer: RendererSection {
                block_size: Some(config.block_size),
                vrr: Some(config.use_vrr),
                visual_mode: Some(config.visual_mode.to_string()),
                logical_size: Some([config.logical_size.0, config.logical_size.1]),
                debug_uv: Some(config.debug_uv),
                edge_weight: None,
                edr_headroom: Some(config.edr_headroom),
                zone_weights: Some(config.zone_weights),
            },
            window: WindowSection {
                size: Some([window.surface_size.0, window.surface_size.1]),
                vsync: Some(window.vsync),
                power: Some(window.power.to_string()),
            },
        }
    }

    fn apply(&self, config: &mut RendererConfig, window: &mut WindowOptions) -> Result<()> {
        let section = &self.renderer;
        if let Some(block_size) = section.block_size {
            config.block_size = block_size;
        }
        if let Some(vrr) = section.vrr {
            config.use_vrr = vrr;
        }
        if let Some(mode) = &section.visual_mode {
            config.visual_mode = mode.parse::<VisualMode>()?;
        }
        if let Some([width, height]) = section.logical_size {
            config.logical_size = (width, height);
        }
        if let Some(debug_uv) = section.debug_uv {
            config.debug_uv = debug_uv;
        }
        match (section.zone_weights, section.edge_weight) {
            (Some(weights), edge) => {
                if edge.is_some() {
                    tracing::warn!("config sets both zone_weights and edge_weight; using zone_weights");
                }
                config.zone_weights = weights;
            }
            (None, Some(edge)) => config.zone_weights = ZoneWeights::periphery(edge),
            (None, None) => {}
        }
        if let Some(headroom) = section.edr_headroom {
            config.edr_headroom = headroom;
        }

        if let Some([width, height]) = self.window.size {
            window.surface_size = (width, height);
        }
        if let Some(vsync) = self.window.vsync {
            window.vsync = vsync;
        }
        if let Some(power) = &self.window.power {
            window.power = power.parse::<GpuPowerPreference>().map_err(|err| anyhow!(err))?;
        }
        Ok(())
    }
}

/// The merged configuration and the file it came from, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub renderer: RendererConfig,
    pub window: WindowOptions,
    pub source: Option<PathBuf>,
}

/// `config.toml` inside `$VRRTEST_CONFIG_DIR`, else inside the platform
/// config directory.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(dir) = env::var_os(ENV_CONFIG_DIR) {
        return Ok(PathBuf::from(dir).join(CONFIG_FILE_NAME));
    }
    let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .ok_or_else(|| anyhow!("failed to determine user directories"))?;
    Ok(project_dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// An explicit path must exist; the default location is optional.
fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("config file {} does not exist", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }
    let path = default_config_path()?;
    Ok(path.is_file().then_some(path))
}

pub fn resolve(args: &RunArgs) -> Result<Settings> {
    let mut renderer = RendererConfig::default();
    let mut window = WindowOptions::default();

    let source = locate(args.config.as_deref())?;
    if let Some(path) = &source {
        FileConfig::load(path)?
            .apply(&mut renderer, &mut window)
            .with_context(|| format!("invalid value in config file {}", path.display()))?;
    }
    apply_args(args, &mut renderer, &mut window);

    renderer.validate().context("invalid configuration")?;
    if window.surface_size.0 == 0 || window.surface_size.1 == 0 {
        bail!("invalid configuration: window size must be greater than zero");
    }
    Ok(Settings {
        renderer,
        window,
        source,
    })
}

fn apply_args(args: &RunArgs, config: &mut RendererConfig, window: &mut WindowOptions) {
    if let Some(size) = args.logical_size {
        config.logical_size = size;
    }
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }
    if args.no_vrr {
        config.use_vrr = false;
    }
    if let Some(mode) = args.visual {
        config.visual_mode = mode;
    }
    if let Some(debug_uv) = args.debug_uv {
        config.debug_uv = debug_uv;
    }
    if let Some(edge) = args.edge_weight {
        config.zone_weights = ZoneWeights::periphery(edge);
    }
    if let Some(headroom) = args.edr_headroom {
        config.edr_headroom = headroom;
    }
    if let Some(size) = args.window_size {
        window.surface_size = size;
    }
    if args.no_vsync {
        window.vsync = false;
    }
    if let Some(power) = args.power {
        window.power = power;
    }
}
