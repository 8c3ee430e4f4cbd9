//! Latest smoothed bar vector, shared between capture and broadcast
//!
//! The capture callback is the only writer. It publishes a complete new
//! vector with one atomic pointer swap, so readers never see a partially
//! written buffer and the audio thread never waits on a lock held by a
//! network task.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Multiplier applied to bars before they are sent to viewers
pub const DISPLAY_SCALE: f32 = 100.0;

/// Single-writer, multi-reader bar vector
pub struct SpectrumState {
    bars: ArcSwap<Vec<f32>>,
}

impl SpectrumState {
    /// Start with `num_bars` zeros
    pub fn new(num_bars: usize) -> Self {
        Self {
            bars: ArcSwap::from_pointee(vec![0.0; num_bars]),
        }
    }

    /// Current bar vector
    pub fn snapshot(&self) -> Arc<Vec<f32>> {
        self.bars.load_full()
    }

    /// Replace the bar vector
    pub fn publish(&self, bars: Vec<f32>) {
        self.bars.store(Arc::new(bars));
    }

    /// Bars scaled for display, NaN/Inf replaced by zero
    pub fn display_bars(&self) -> Vec<f32> {
        scale_for_display(&self.bars.load())
    }
}

impl Default for SpectrumState {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Multiply by [`DISPLAY_SCALE`] and zero anything non-finite
pub fn scale_for_display(bars: &[f32]) -> Vec<f32> {
    bars.iter()
        .map(|&b| {
            let scaled = b * DISPLAY_SCALE;
            if scaled.is_finite() {
                scaled
            } else {
                0.0
            }
        })
        .collect()
}
