use ratemap::Extent;
use renderer::{ConfigHandle, Renderer, RendererConfig, StatisticsReport, VisualMode, WindowOptions};

/// Whether any adapter is available; CI machines frequently have none.
fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())).is_ok()
}

fn run(config: RendererConfig, frames: u32) -> Option<Vec<StatisticsReport>> {
    if !gpu_available() {
        eprintln!("skipping headless render test: no GPU adapter available");
        return None;
    }
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let options = WindowOptions {
        surface_size: (640, 480),
        ..WindowOptions::default()
    };
    Some(
        Renderer::new(ConfigHandle::new(config), options)
            .run_headless(frames)
            .expect("headless run"),
    )
}

#[test]
fn vrr_statistics_match_configured_sizes() {
    let config = RendererConfig {
        logical_size: (1024, 1024),
        block_size: 16,
        ..RendererConfig::default()
    };
    let Some(reports) = run(config, 6) else {
        return;
    };

    assert_eq!(reports.len(), 2, "first and last frame read back");
    for report in &reports {
        assert!(report.use_vrr);
        assert!(report.is_consistent(), "{report:?}");
        assert_eq!(report.deduced_screen.width, 1024);
        assert!(report.deduced_physical.width < 1024);
        assert!(report.deduced_physical.height < 1024);
        assert!((report.debug[0] - 0.5).abs() < 0.01);
    }
    assert!(reports[0].frame < reports[1].frame);
}

#[test]
fn disabled_vrr_renders_one_sample_per_pixel() {
    let config = RendererConfig {
        use_vrr: false,
        logical_size: (512, 768),
        block_size: 7,
        visual_mode: VisualMode::Block,
        debug_uv: [0.25, 0.75],
        ..RendererConfig::default()
    };
    let Some(reports) = run(config, 1) else {
        return;
    };

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert!(report.is_consistent(), "{report:?}");
    assert_eq!(report.deduced_physical, report.deduced_screen);
    assert_eq!(report.aggregated_physical_pixels, 512 * 768);
    assert!((report.debug[0] - 0.25).abs() < 0.01);
    assert!((report.debug[1] - 0.75).abs() < 0.01);
}

#[test]
fn config_set_before_a_run_is_used() {
    let Some(_) = run(RendererConfig::default(), 1) else {
        return;
    };
    let renderer = Renderer::new(
        ConfigHandle::default(),
        WindowOptions {
            surface_size: (320, 240),
            ..WindowOptions::default()
        },
    );
    renderer.config().update(|config| {
        config.use_vrr = false;
        config.block_size = 32;
    });
    let reports = renderer.run_headless(2).expect("headless run");
    assert!(reports.iter().all(|report| !report.use_vrr && report.block_size == 32));
    assert!(reports.iter().all(StatisticsReport::is_consistent));
}

#[test]
fn resizing_mid_run_reports_the_new_size_once() {
    if !gpu_available() {
        eprintln!("skipping headless render test: no GPU adapter available");
        return;
    }
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let renderer = Renderer::new(
        ConfigHandle::new(RendererConfig {
            logical_size: (1024, 1024),
            ..RendererConfig::default()
        }),
        WindowOptions {
            surface_size: (320, 240),
            ..WindowOptions::default()
        },
    );
    let mut session = renderer.headless().expect("headless session");
    for _ in 0..3 {
        session.render_frame().expect("frame");
    }
    renderer.config().update(|config| config.logical_size = (512, 768));
    for _ in 0..4 {
        session.render_frame().expect("frame");
    }
    let reports = session.finish().expect("finish");

    assert_eq!(reports.len(), 2, "{reports:?}");
    assert_eq!(reports[0].frame, 0);
    assert_eq!(reports[0].configured_screen, Extent::new(1024, 1024));

    let resized = &reports[1];
    assert_eq!(resized.frame, 3, "first frame after the change");
    assert_eq!(resized.configured_screen, Extent::new(512, 768));
    assert_eq!(resized.deduced_screen, Extent::new(512, 768));
    assert!(resized.is_consistent(), "{resized:?}");
}
