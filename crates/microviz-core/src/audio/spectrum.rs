//! Spectrum processor - sample block in, smoothed display bars out
//!
//! One call to [`SpectrumProcessor::process`] runs the whole per-block
//! transform:
//!
//! 1. magnitude of the forward FFT of the block, zero-padded or truncated to
//!    the transform size, keeping the first `fft_size / 2` bins
//! 2. normalization against the largest magnitude (silence stays all zero)
//! 3. nearest-below resampling to exactly `num_bars` values
//! 4. NaN/Inf replaced by zero
//! 5. exponential smoothing against the previous bar vector
//!
//! The individual steps are exposed as free functions so they can be
//! exercised on their own. None of them can fail.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use tracing::debug;

use crate::settings::Settings;

/// Per-block transform parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumConfig {
    /// Transform length (samples)
    pub fft_size: usize,
    /// Number of output bars
    pub num_bars: usize,
    /// Weight of the previous bar vector (0.0 - 1.0)
    pub smoothing: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Settings::default().into()
    }
}

impl From<Settings> for SpectrumConfig {
    fn from(settings: Settings) -> Self {
        Self {
            fft_size: settings.fft_size,
            num_bars: settings.num_bars,
            smoothing: settings.smoothing as f32,
        }
    }
}

/// Reusable FFT plan and buffers for the capture path
pub struct SpectrumProcessor {
    /// Planned transform for `fft_size`
    fft: Arc<dyn Fft<f32>>,

    /// Size the plan and buffers were built for
    fft_size: usize,

    /// FFT complex buffer
    fft_buffer: Vec<Complex<f32>>,

    /// FFT scratch buffer
    scratch_buffer: Vec<Complex<f32>>,

    /// Magnitude buffer (only positive frequencies)
    magnitude_buffer: Vec<f32>,
}

impl SpectrumProcessor {
    /// Create a processor planned for `fft_size`
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();

        debug!("SpectrumProcessor planned for fft_size={}", fft_size);

        Self {
            fft,
            fft_size,
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch_buffer: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitude_buffer: vec![0.0; fft_size / 2],
        }
    }

    /// Transform size the processor is currently planned for
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Run one block through the full pipeline
    pub fn process(&mut self, block: &[f32], config: &SpectrumConfig, previous: &[f32]) -> Vec<f32> {
        if config.fft_size != self.fft_size {
            *self = Self::new(config.fft_size);
        }

        self.compute_magnitudes(block);
        normalize(&mut self.magnitude_buffer);

        let mut bars = interpolate(&self.magnitude_buffer, config.num_bars);
        sanitize(&mut bars);
        smooth(&bars, previous, config.smoothing)
    }

    /// Magnitude spectrum of the block (first half of the bins)
    pub fn magnitudes(&mut self, block: &[f32]) -> &[f32] {
        self.compute_magnitudes(block);
        &self.magnitude_buffer
    }

    fn compute_magnitudes(&mut self, block: &[f32]) {
        let used = block.len().min(self.fft_size);
        for (slot, &sample) in self.fft_buffer.iter_mut().zip(&block[..used]) {
            *slot = Complex::new(sample, 0.0);
        }
        for slot in &mut self.fft_buffer[used..] {
            *slot = Complex::new(0.0, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.fft_buffer, &mut self.scratch_buffer);

        for (magnitude, bin) in self.magnitude_buffer.iter_mut().zip(&self.fft_buffer) {
            *magnitude = bin.norm();
        }
    }
}

impl Default for SpectrumProcessor {
    fn default() -> Self {
        Self::new(SpectrumConfig::default().fft_size)
    }
}

/// Divide by the largest value; all zeros if that is not a positive number
pub fn normalize(magnitudes: &mut [f32]) {
    let max = magnitudes.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 && max.is_finite() {
        for m in magnitudes.iter_mut() {
            *m /= max;
        }
    } else {
        magnitudes.fill(0.0);
    }
}

/// Source bin sampled by output bar `index`.
///
/// `floor(index * (spectrum_len - 1) / (num_bars - 1))` in exact integer
/// arithmetic. A single bar samples bin 0.
pub fn source_index(index: usize, spectrum_len: usize, num_bars: usize) -> usize {
    if num_bars <= 1 || spectrum_len == 0 {
        return 0;
    }
    let span = (spectrum_len - 1) as u128;
    ((index as u128 * span) / (num_bars - 1) as u128) as usize
}

/// Nearest-below resampling of `spectrum` to `num_bars` values
pub fn interpolate(spectrum: &[f32], num_bars: usize) -> Vec<f32> {
    if spectrum.is_empty() {
        return vec![0.0; num_bars];
    }
    (0..num_bars)
        .map(|i| spectrum[source_index(i, spectrum.len(), num_bars)])
        .collect()
}

/// Replace NaN and infinities with zero
pub fn sanitize(values: &mut [f32]) {
    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
}

/// `smoothing * previous + (1 - smoothing) * current`, elementwise.
///
/// A `previous` of the wrong length (bar count changed) counts as zeros.
pub fn smooth(current: &[f32], previous: &[f32], smoothing: f32) -> Vec<f32> {
    if previous.len() != current.len() {
        return current.iter().map(|&c| (1.0 - smoothing) * c).collect();
    }
    current
        .iter()
        .zip(previous)
        .map(|(&c, &p)| smoothing * p + (1.0 - smoothing) * c)
        .collect()
}
