// THEORY:
// The `color_sampler` turns one camera frame into the fixed palette a session is
// played against. It is the spatial-pooling step of this crate: millions of noisy
// pixels collapse into a handful of quantized buckets and a count for each.
//
// Key architectural principles:
// 1.  **Histogram, then rank**: A `ColorFrequencyMap` is built once per pass by
//     quantizing every pixel. Ranking happens afterwards and the map is dropped.
// 2.  **Deterministic ties**: Each bucket remembers the scan index where it first
//     appeared. Ranking sorts by count (descending) and then by that index, so two
//     equally common colors keep the order the scan met them in.
// 3.  **Shardable**: Maps built over disjoint row spans merge into exactly the map
//     a single sequential scan would have produced (counts add, first-seen takes
//     the minimum). The parallel pipeline relies on this.
// 4.  **No padding**: A frame with fewer than `PALETTE_SIZE` buckets is an error,
//     never a palette with invented entries.

use crate::core_modules::pixel::PixelBuffer;
use crate::core_modules::quantized_color::QuantizedColor;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Number of dominant colors a session is played with.
pub const PALETTE_SIZE: usize = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("frame has {found} distinct quantized colors, {required} are required")]
    InsufficientColorVariety { found: usize, required: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tally {
    count: u64,
    first_seen: usize,
}

/// Occurrence count per quantized color for one sampling pass.
#[derive(Debug, Clone, Default)]
pub struct ColorFrequencyMap {
    tallies: HashMap<QuantizedColor, Tally>,
}

impl ColorFrequencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Histogram of the whole frame.
    pub fn from_buffer(buffer: &PixelBuffer) -> Self {
        Self::from_rows(buffer, 0, buffer.height())
    }

    /// Histogram of rows `[start_row, end_row)`; scan indices stay frame-global.
    pub fn from_rows(buffer: &PixelBuffer, start_row: u32, end_row: u32) -> Self {
        let mut map = Self::new();
        for (scan_index, pixel) in buffer.row_span(start_row, end_row) {
            map.record(QuantizedColor::from(pixel), scan_index);
        }
        map
    }

    /// Counts one occurrence of `color` seen at `scan_index`.
    pub fn record(&mut self, color: QuantizedColor, scan_index: usize) {
        let tally = self.tallies.entry(color).or_insert(Tally {
            count: 0,
            first_seen: scan_index,
        });
        tally.count += 1;
        tally.first_seen = tally.first_seen.min(scan_index);
    }

    /// Folds another shard's counts into this one.
    pub fn merge(&mut self, other: ColorFrequencyMap) {
        for (color, theirs) in other.tallies {
            self.tallies
                .entry(color)
                .and_modify(|ours| {
                    ours.count += theirs.count;
                    ours.first_seen = ours.first_seen.min(theirs.first_seen);
                })
                .or_insert(theirs);
        }
    }

    pub fn len(&self) -> usize {
        self.tallies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    pub fn count(&self, color: &QuantizedColor) -> u64 {
        self.tallies.get(color).map_or(0, |tally| tally.count)
    }

    /// All colors, most frequent first; ties keep first-appearance order.
    pub fn ranked(&self) -> Vec<(QuantizedColor, u64)> {
        let mut entries: Vec<_> = self.tallies.iter().collect();
        entries.sort_by(|(_, a), (_, b)| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        });
        entries
            .into_iter()
            .map(|(color, tally)| (*color, tally.count))
            .collect()
    }

    /// The `PALETTE_SIZE` most frequent colors.
    pub fn into_palette(self) -> Result<SavedColorSet, SampleError> {
        if self.len() < PALETTE_SIZE {
            return Err(SampleError::InsufficientColorVariety {
                found: self.len(),
                required: PALETTE_SIZE,
            });
        }
        let colors = self
            .ranked()
            .into_iter()
            .take(PALETTE_SIZE)
            .map(|(color, _)| color)
            .collect();
        Ok(SavedColorSet::from_distinct(colors))
    }
}

/// The six dominant colors of a session, most frequent first. Fixed once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedColorSet {
    colors: Vec<QuantizedColor>,
}

impl SavedColorSet {
    /// Caller guarantees `colors` holds exactly `PALETTE_SIZE` distinct entries.
    pub(crate) fn from_distinct(colors: Vec<QuantizedColor>) -> Self {
        debug_assert_eq!(colors.len(), PALETTE_SIZE);
        Self { colors }
    }

    pub fn colors(&self) -> &[QuantizedColor] {
        &self.colors
    }

    pub fn get(&self, slot: usize) -> Option<QuantizedColor> {
        self.colors.get(slot).copied()
    }

    /// Slot of `color` in the palette.
    pub fn position(&self, color: &QuantizedColor) -> Option<usize> {
        self.colors.iter().position(|c| c == color)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn into_vec(self) -> Vec<QuantizedColor> {
        self.colors
    }
}

/// Up to `limit` most frequent colors of a frame with their counts.
pub fn rank_colors(buffer: &PixelBuffer, limit: usize) -> Vec<(QuantizedColor, u64)> {
    let mut ranked = ColorFrequencyMap::from_buffer(buffer).ranked();
    ranked.truncate(limit);
    ranked
}

/// Sequential sampling pass over the whole frame.
pub fn sample_dominant_colors(buffer: &PixelBuffer) -> Result<SavedColorSet, SampleError> {
    ColorFrequencyMap::from_buffer(buffer).into_palette()
}

/// Splits `height` rows into at most `shards` contiguous, non-empty spans.
pub fn shard_rows(height: u32, shards: usize) -> Vec<(u32, u32)> {
    // Clamp before narrowing so counts past `u32::MAX` cannot wrap to zero.
    let shards = shards.clamp(1, height.max(1) as usize) as u32;
    let base = height / shards;
    let extra = height % shards;
    let mut spans = Vec::with_capacity(shards as usize);
    let mut start = 0;
    for i in 0..shards {
        let rows = base + u32::from(i < extra);
        if rows == 0 {
            continue;
        }
        spans.push((start, start + rows));
        start += rows;
    }
    spans
}
