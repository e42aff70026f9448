use anyhow::{anyhow, Context, Result};
use ratemap::{Extent, StatisticsSnapshot};
use tracing::{info, warn};

/// What the statistics of a frame should add up to, captured when the frame
/// was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExpectedStatistics {
    pub use_vrr: bool,
    pub logical: Extent,
    /// Extent of the target the frame rendered into.
    pub active: Extent,
    pub block_size: u32,
}

/// Decoded counters of one frame next to the values they should reproduce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsReport {
    pub frame: u64,
    pub use_vrr: bool,
    pub block_size: u32,
    pub configured_screen: Extent,
    pub deduced_screen: Extent,
    pub configured_physical: Extent,
    pub deduced_physical: Extent,
    pub expected_screen_pixels: u64,
    pub aggregated_screen_pixels: u64,
    pub expected_physical_pixels: u64,
    pub aggregated_physical_pixels: u64,
    /// Debug UV transformed into physical UV by the GPU.
    pub debug: [f32; 2],
}

impl StatisticsReport {
    pub(crate) fn new(frame: u64, expected: ExpectedStatistics, snapshot: StatisticsSnapshot) -> Self {
        Self {
            frame,
            use_vrr: expected.use_vrr,
            block_size: expected.block_size,
            configured_screen: expected.logical,
            deduced_screen: snapshot.deduced_screen(),
            configured_physical: expected.active,
            deduced_physical: snapshot.deduced_physical(),
            expected_screen_pixels: expected.logical.area(),
            aggregated_screen_pixels: snapshot.screen_pixels,
            expected_physical_pixels: expected.active.area(),
            aggregated_physical_pixels: snapshot.physical_pixels,
            debug: snapshot.debug_values(),
        }
    }

    /// Aggregated counters reproduce the configured sizes exactly.
    pub fn is_consistent(&self) -> bool {
        self.deduced_screen == self.configured_screen
            && self.deduced_physical == self.configured_physical
            && self.aggregated_screen_pixels == self.expected_screen_pixels
            && self.aggregated_physical_pixels == self.expected_physical_pixels
    }

    pub fn log(&self) {
        if self.is_consistent() {
            info!(
                frame = self.frame,
                vrr = self.use_vrr,
                block = self.block_size,
                screen = %self.deduced_screen,
                physical = %self.deduced_physical,
                screen_pixels = self.aggregated_screen_pixels,
                physical_pixels = self.aggregated_physical_pixels,
                debug_u = self.debug[0],
                debug_v = self.debug[1],
                "tile statistics"
            );
        } else {
            warn!(
                frame = self.frame,
                vrr = self.use_vrr,
                block = self.block_size,
                configured_screen = %self.configured_screen,
                deduced_screen = %self.deduced_screen,
                configured_physical = %self.configured_physical,
                deduced_physical = %self.deduced_physical,
                expected_screen_pixels = self.expected_screen_pixels,
                screen_pixels = self.aggregated_screen_pixels,
                expected_physical_pixels = self.expected_physical_pixels,
                physical_pixels = self.aggregated_physical_pixels,
                "tile statistics do not match configured sizes"
            );
        }
    }
}

/// Map `staging`, decode the counters and unmap again.
///
/// The copy into `staging` was recorded into `submission`; only that
/// submission is waited for, later frames may still be executing.
pub(crate) fn read_statistics(
    device: &wgpu::Device,
    submission: &wgpu::SubmissionIndex,
    staging: &wgpu::Buffer,
) -> Result<StatisticsSnapshot> {
    let slice = staging.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::WaitForSubmissionIndex(submission.clone()))
        .context("failed to poll device for statistics readback")?;
    receiver
        .recv()
        .context("statistics map callback never fired")?
        .context("failed to map statistics buffer")?;

    let snapshot = {
        let mapped = slice.get_mapped_range();
        StatisticsSnapshot::from_bytes(&mapped)
    };
    staging.unmap();
    snapshot.ok_or_else(|| anyhow!("statistics buffer is smaller than the counter layout"))
}

#[cfg(test)]
mod tests {
    use ratemap::{aggregate, RateMap, ZoneWeights};

    use super::*;

    fn expected(use_vrr: bool, active: Extent) -> ExpectedStatistics {
        ExpectedStatistics {
            use_vrr,
            logical: Extent::new(1024, 1024),
            active,
            block_size: 16,
        }
    }

    #[test]
    fn reference_aggregation_is_consistent() {
        let map = RateMap::new(Extent::new(1024, 1024), ZoneWeights::default()).unwrap();
        let snapshot = aggregate(&map, 16, [0.5, 0.5]);
        let report = StatisticsReport::new(7, expected(true, map.physical_size()), snapshot);
        assert!(report.is_consistent());
        assert_eq!(report.deduced_physical, Extent::new(640, 640));
        assert_eq!(report.debug, [0.5, 0.5]);
    }

    #[test]
    fn identity_statistics_are_one_to_one() {
        let map = RateMap::identity(Extent::new(1024, 1024)).unwrap();
        let snapshot = aggregate(&map, 32, [0.25, 0.75]);
        let report = StatisticsReport::new(1, expected(false, Extent::new(1024, 1024)), snapshot);
        assert!(report.is_consistent());
        assert_eq!(report.aggregated_screen_pixels, report.aggregated_physical_pixels);
        assert_eq!(report.debug, [0.25, 0.75]);
    }

    #[test]
    fn missing_counts_are_flagged() {
        let map = RateMap::new(Extent::new(1024, 1024), ZoneWeights::default()).unwrap();
        let mut snapshot = aggregate(&map, 16, [0.5, 0.5]);
        snapshot.screen_cols -= 12;
        let report = StatisticsReport::new(2, expected(true, map.physical_size()), snapshot);
        assert!(!report.is_consistent());
        assert_eq!(report.deduced_screen, Extent::new(1012, 1024));

        // A report checked against the wrong target size is inconsistent too.
        let snapshot = aggregate(&map, 16, [0.5, 0.5]);
        let report = StatisticsReport::new(3, expected(true, Extent::new(1024, 1024)), snapshot);
        assert!(!report.is_consistent());
    }
}
