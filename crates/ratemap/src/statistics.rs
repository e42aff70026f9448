//! Layout of the tile statistics buffer and a CPU reference for the GPU
//! aggregation pass.
//!
//! The GPU pass walks the active target in `block_size`² tiles, accumulates
//! per-tile counters in workgroup memory and flushes each counter into the
//! shared buffer with a single atomic add. [`aggregate`] performs the same
//! per-sample arithmetic so tests can compare the two without a device.

use crate::map::{Extent, RateMap};

pub const STATISTICS_WORDS: usize = 8;
pub const STATISTICS_BYTES: u64 = (STATISTICS_WORDS * std::mem::size_of::<u32>()) as u64;

pub const TOTAL_PHYSICAL_ROW: usize = 0;
pub const TOTAL_PHYSICAL_COL: usize = 1;
pub const TOTAL_SCREEN_ROW: usize = 2;
pub const TOTAL_SCREEN_COL: usize = 3;
pub const SUM_SCREEN_PIXEL: usize = 4;
pub const SUM_PHYSICAL_PIXEL: usize = 5;
pub const DEBUG0: usize = 6;
pub const DEBUG1: usize = 7;

/// Fixed-point scale applied to the debug scalars before they are stored as integers.
pub const DEBUG_SCALE: f32 = 1000.0;

/// Decoded contents of the statistics buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatisticsSnapshot {
    pub physical_rows: u64,
    pub physical_cols: u64,
    pub screen_rows: u64,
    pub screen_cols: u64,
    pub screen_pixels: u64,
    pub physical_pixels: u64,
    /// Raw fixed-point debug words.
    pub debug: [u32; 2],
}

impl StatisticsSnapshot {
    pub fn decode(words: &[u32]) -> Option<Self> {
        if words.len() < STATISTICS_WORDS {
            return None;
        }
        Some(Self {
            physical_rows: u64::from(words[TOTAL_PHYSICAL_ROW]),
            physical_cols: u64::from(words[TOTAL_PHYSICAL_COL]),
            screen_rows: u64::from(words[TOTAL_SCREEN_ROW]),
            screen_cols: u64::from(words[TOTAL_SCREEN_COL]),
            screen_pixels: u64::from(words[SUM_SCREEN_PIXEL]),
            physical_pixels: u64::from(words[SUM_PHYSICAL_PIXEL]),
            debug: [words[DEBUG0], words[DEBUG1]],
        })
    }

    /// Decode a mapped staging buffer (little-endian `u32` words).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < STATISTICS_BYTES as usize {
            return None;
        }
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .take(STATISTICS_WORDS)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Self::decode(&words)
    }

    /// Combine two partial results. Counters add; the debug words are only
    /// written by the origin tile, so the non-zero side wins.
    pub fn merge(self, other: Self) -> Self {
        Self {
            physical_rows: self.physical_rows + other.physical_rows,
            physical_cols: self.physical_cols + other.physical_cols,
            screen_rows: self.screen_rows + other.screen_rows,
            screen_cols: self.screen_cols + other.screen_cols,
            screen_pixels: self.screen_pixels + other.screen_pixels,
            physical_pixels: self.physical_pixels + other.physical_pixels,
            debug: [
                self.debug[0].max(other.debug[0]),
                self.debug[1].max(other.debug[1]),
            ],
        }
    }

    pub fn debug_values(&self) -> [f32; 2] {
        [
            self.debug[0] as f32 / DEBUG_SCALE,
            self.debug[1] as f32 / DEBUG_SCALE,
        ]
    }

    /// Screen extent implied by the row/column totals.
    pub fn deduced_screen(&self) -> Extent {
        Extent::new(saturate(self.screen_cols), saturate(self.screen_rows))
    }

    pub fn deduced_physical(&self) -> Extent {
        Extent::new(saturate(self.physical_cols), saturate(self.physical_rows))
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

pub fn encode_debug(value: f32) -> u32 {
    (value.clamp(0.0, 1.0) * DEBUG_SCALE).round() as u32
}

/// One tile of the active target, in physical samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Number of tiles per axis; the compute dispatch size.
pub fn block_grid(extent: Extent, block_size: u32) -> (u32, u32) {
    let block = block_size.max(1);
    (extent.width.div_ceil(block), extent.height.div_ceil(block))
}

/// Row-major tiles covering `extent`. The last tile on each axis keeps its
/// true, possibly partial, extent.
pub fn blocks(extent: Extent, block_size: u32) -> impl Iterator<Item = BlockRegion> {
    let block = block_size.max(1);
    let (columns, rows) = block_grid(extent, block);
    (0..rows).flat_map(move |row| {
        (0..columns).map(move |column| {
            let x = column * block;
            let y = row * block;
            BlockRegion {
                x,
                y,
                width: block.min(extent.width - x),
                height: block.min(extent.height - y),
            }
        })
    })
}

pub fn aggregate_block(map: &RateMap, block: BlockRegion, debug_uv: [f32; 2]) -> StatisticsSnapshot {
    let horizontal = map.horizontal();
    let vertical = map.vertical();
    let mut snapshot = StatisticsSnapshot::default();

    for y in block.y..block.y + block.height {
        let span_y = u64::from(vertical.sample_span(y));
        for x in block.x..block.x + block.width {
            let span_x = u64::from(horizontal.sample_span(x));
            snapshot.physical_pixels += 1;
            snapshot.screen_pixels += span_x * span_y;
            if x == 0 {
                snapshot.physical_rows += 1;
                snapshot.screen_rows += span_y;
            }
            if y == 0 {
                snapshot.physical_cols += 1;
                snapshot.screen_cols += span_x;
            }
        }
    }

    if block.x == 0 && block.y == 0 {
        let physical_uv = map.uv_to_physical(debug_uv);
        snapshot.debug = [encode_debug(physical_uv[0]), encode_debug(physical_uv[1])];
    }
    snapshot
}

/// Reference result for the whole physical target of `map`.
pub fn aggregate(map: &RateMap, block_size: u32, debug_uv: [f32; 2]) -> StatisticsSnapshot {
    blocks(map.physical_size(), block_size)
        .map(|block| aggregate_block(map, block, debug_uv))
        .fold(StatisticsSnapshot::default(), StatisticsSnapshot::merge)
}
