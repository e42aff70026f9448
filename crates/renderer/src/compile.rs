use std::borrow::Cow;

/// Bindings, rate-map transforms and shared constants.
const COMMON: &str = include_str!("shaders/common.wgsl");
/// Fullscreen-triangle vertex stage shared by both render passes.
const FULLSCREEN: &str = include_str!("shaders/fullscreen.wgsl");
const OFFSCREEN: &str = include_str!("shaders/offscreen.wgsl");
const STATISTICS: &str = include_str!("shaders/statistics.wgsl");
const COMPOSITE: &str = include_str!("shaders/composite.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShaderStage {
    Offscreen,
    Statistics,
    Composite,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 3] = [
        ShaderStage::Offscreen,
        ShaderStage::Statistics,
        ShaderStage::Composite,
    ];

    fn label(self) -> &'static str {
        match self {
            ShaderStage::Offscreen => "offscreen shader",
            ShaderStage::Statistics => "statistics shader",
            ShaderStage::Composite => "composite shader",
        }
    }

    /// Full WGSL source: the common prelude followed by the stage body.
    pub fn source(self) -> String {
        match self {
            ShaderStage::Offscreen => format!("{COMMON}\n{FULLSCREEN}\n{OFFSCREEN}"),
            ShaderStage::Statistics => format!("{COMMON}\n{STATISTICS}"),
            ShaderStage::Composite => format!("{COMMON}\n{FULLSCREEN}\n{COMPOSITE}"),
        }
    }
}

pub(crate) fn compile_shader(device: &wgpu::Device, stage: ShaderStage) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(stage.label()),
        source: wgpu::ShaderSource::Wgsl(Cow::Owned(stage.source())),
    })
}

#[cfg(test)]
mod tests {
    use wgpu::naga;

    use super::*;

    fn validate(stage: ShaderStage) -> naga::Module {
        let source = stage.source();
        let module = naga::front::wgsl::parse_str(&source)
            .unwrap_or_else(|err| panic!("{stage:?}: {}", err.emit_to_string(&source)));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::empty(),
        )
        .validate(&module)
        .unwrap_or_else(|err| panic!("{stage:?}: {}", err.emit_to_string(&source)));
        module
    }

    #[test]
    fn every_stage_validates() {
        for stage in ShaderStage::ALL {
            validate(stage);
        }
    }

    #[test]
    fn stages_export_expected_entry_points() {
        let entry_points = |stage| {
            validate(stage)
                .entry_points
                .iter()
                .map(|entry| entry.name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(entry_points(ShaderStage::Offscreen), ["vs_main", "fs_main"]);
        assert_eq!(entry_points(ShaderStage::Statistics), ["cs_main"]);
        assert_eq!(entry_points(ShaderStage::Composite), ["vs_main", "fs_main"]);
    }

    #[test]
    fn statistics_layout_matches_host_constants() {
        let source = ShaderStage::Statistics.source();
        assert!(source.contains(&format!(
            "array<atomic<u32>, {}>",
            ratemap::statistics::STATISTICS_WORDS
        )));
        assert!(source.contains(&format!(
            "const SUM_PHYSICAL_PIXEL: u32 = {}u;",
            ratemap::statistics::SUM_PHYSICAL_PIXEL
        )));
        assert!(source.contains("const DEBUG_SCALE: f32 = 1000.0;"));
    }
}
