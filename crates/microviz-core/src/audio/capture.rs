//! Capture driver - input device to shared spectrum state
//!
//! [`CaptureCycle`] is the per-block work: snapshot the settings, run the
//! spectrum processor against the current bars, publish the result. It has
//! no device dependency.
//!
//! [`CaptureDriver`] owns the cpal input stream on a dedicated thread (cpal
//! streams are not `Send` on every host) and drives a `CaptureCycle` from the
//! audio callback. The device is opened with whatever channel layout it
//! offers at the requested rate and only the first channel is kept. Host
//! callbacks may deliver any number of frames, so samples are collected
//! until a full `CHUNK_SIZE` block is available. When the sample rate or
//! block size change it closes the stream and opens a new one; every other
//! setting is picked up by the next block.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

use super::spectrum::{SpectrumConfig, SpectrumProcessor};
use super::state::SpectrumState;
use crate::settings::SettingsStore;

#[cfg(feature = "audio")]
use crate::error::AudioError;
#[cfg(feature = "audio")]
use crate::settings::DeviceParams;
#[cfg(feature = "audio")]
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
#[cfg(feature = "audio")]
use cpal::{
    FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig, SupportedStreamConfig,
    SupportedStreamConfigRange,
};
#[cfg(feature = "audio")]
use crossbeam_channel::{bounded, Receiver};
#[cfg(feature = "audio")]
use std::thread::{self, JoinHandle};
#[cfg(feature = "audio")]
use tracing::{error, info};

/// Input device selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device name; the host's default input device when unset
    pub device: Option<String>,
}

/// One block through the processor into the shared state
pub struct CaptureCycle {
    processor: SpectrumProcessor,
    settings: Arc<SettingsStore>,
    state: Arc<SpectrumState>,
    /// Samples not yet forming a full block
    pending: Vec<f32>,
    blocks: u64,
}

impl CaptureCycle {
    /// Create a cycle planned for the store's current transform size
    pub fn new(settings: Arc<SettingsStore>, state: Arc<SpectrumState>) -> Self {
        let snapshot = settings.snapshot();
        Self {
            processor: SpectrumProcessor::new(snapshot.fft_size),
            pending: Vec::with_capacity(snapshot.block_size * 2),
            settings,
            state,
            blocks: 0,
        }
    }

    /// Append interleaved frames, keeping channel 0, and process every
    /// complete `CHUNK_SIZE` block.
    ///
    /// A partial block is carried over to the next call.
    pub fn push_interleaved<T: Copy>(
        &mut self,
        data: &[T],
        channels: usize,
        convert: impl Fn(T) -> f32,
    ) {
        let channels = channels.max(1);
        self.pending
            .extend(data.iter().step_by(channels).map(|&s| convert(s)));

        let block_size = self.settings.snapshot().block_size.max(1);
        let full = self.pending.len() / block_size * block_size;
        if full == 0 {
            return;
        }

        let mut pending = std::mem::take(&mut self.pending);
        for block in pending[..full].chunks_exact(block_size) {
            self.process_block(block);
        }
        pending.drain(..full);
        self.pending = pending;
    }

    /// Samples waiting for the rest of their block
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Process one mono block and publish the new bars
    pub fn process_block(&mut self, block: &[f32]) {
        let config = SpectrumConfig::from(self.settings.snapshot());
        let previous = self.state.snapshot();

        if previous.len() != config.num_bars {
            debug!(
                "Bar count changed {} -> {}, resetting smoothing baseline",
                previous.len(),
                config.num_bars
            );
        }

        let bars = self.processor.process(block, &config, &previous);
        self.state.publish(bars);
        self.blocks += 1;

        if self.blocks % 1000 == 0 {
            trace!("Capture: {} blocks processed", self.blocks);
        }
    }

    /// Blocks processed so far
    pub fn blocks(&self) -> u64 {
        self.blocks
    }
}

/// Handle to the capture thread
#[cfg(feature = "audio")]
pub struct CaptureDriver {
    thread: Option<JoinHandle<()>>,
    fatal: Receiver<AudioError>,
}

#[cfg(feature = "audio")]
impl CaptureDriver {
    /// Names of the available input devices
    pub fn list_devices() -> Result<Vec<String>, AudioError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::DeviceEnumeration(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    /// Open the input device and start capturing.
    ///
    /// Returns once the first stream is playing; a device that cannot be
    /// opened is reported here.
    pub fn spawn(
        config: CaptureConfig,
        settings: Arc<SettingsStore>,
        state: Arc<SpectrumState>,
    ) -> Result<Self, AudioError> {
        let (startup_tx, startup_rx) = bounded(1);
        let (fatal_tx, fatal_rx) = bounded(1);

        let thread = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let changes = settings.subscribe_device_changes();
                let mut params = settings.snapshot().device_params();

                let mut stream = match open_stream(&config, params, &settings, &state) {
                    Ok(stream) => {
                        let _ = startup_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = startup_tx.send(Err(e));
                        return;
                    }
                };

                // Runs for the life of the process unless a reopen fails
                while let Ok(mut next) = changes.recv() {
                    while let Ok(newer) = changes.try_recv() {
                        next = newer;
                    }
                    if next == params {
                        continue;
                    }

                    info!(
                        "Reopening input device: {} Hz / {} samples -> {} Hz / {} samples",
                        params.sample_rate, params.block_size, next.sample_rate, next.block_size
                    );
                    drop(stream);

                    match open_stream(&config, next, &settings, &state) {
                        Ok(reopened) => {
                            stream = reopened;
                            params = next;
                        }
                        Err(e) => {
                            error!("Failed to reopen input device: {}", e);
                            let _ = fatal_tx.send(e);
                            return;
                        }
                    }
                }

                debug!("Capture thread exiting");
            })
            .map_err(|e| AudioError::ThreadTerminated(e.to_string()))?;

        match startup_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                thread: Some(thread),
                fatal: fatal_rx,
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(AudioError::ThreadTerminated(
                "capture thread exited during startup".to_string(),
            )),
        }
    }

    /// Block until the device fails after startup.
    ///
    /// Returns `None` if the capture thread ended without an error.
    pub fn wait_fatal(mut self) -> Option<AudioError> {
        let result = self.fatal.recv().ok();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result
    }
}

#[cfg(feature = "audio")]
fn open_stream(
    config: &CaptureConfig,
    params: DeviceParams,
    settings: &Arc<SettingsStore>,
    state: &Arc<SpectrumState>,
) -> Result<Stream, AudioError> {
    let host = cpal::default_host();

    let device = match &config.device {
        Some(name) => host
            .input_devices()
            .map_err(|e| AudioError::DeviceEnumeration(e.to_string()))?
            .find(|d| d.name().map(|n| n == *name).unwrap_or(false))
            .ok_or_else(|| AudioError::NoInputDevice(Some(name.clone())))?,
        None => host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice(None))?,
    };

    let ranges = device
        .supported_input_configs()
        .map_err(|e| AudioError::NoSupportedConfig(e.to_string()))?;
    let supported = pick_config(ranges, params.sample_rate).ok_or_else(|| {
        AudioError::NoSupportedConfig(format!(
            "no f32/i16/u16 input at {} Hz",
            params.sample_rate
        ))
    })?;

    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        // Hosts treat this as a hint; the cycle re-blocks whatever arrives
        buffer_size: cpal::BufferSize::Fixed(params.block_size as cpal::FrameCount),
    };

    info!(
        "Opening input device {:?}: {} Hz, {} channel(s), {} samples per block, {:?}",
        device.name().unwrap_or_default(),
        params.sample_rate,
        stream_config.channels,
        params.block_size,
        supported.sample_format()
    );

    let cycle = CaptureCycle::new(settings.clone(), state.clone());
    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, cycle)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, cycle)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, cycle)?,
        other => return Err(AudioError::UnsupportedFormat(format!("{:?}", other))),
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamStart(e.to_string()))?;

    Ok(stream)
}

#[cfg(feature = "audio")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut cycle: CaptureCycle,
) -> Result<Stream, AudioError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                cycle.push_interleaved(data, channels, |s| s.to_sample::<f32>());
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| AudioError::StreamCreation(e.to_string()))
}

/// Preference among the sample formats the driver converts, lower is better
#[cfg(feature = "audio")]
fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Fewest channels, then best format, among ranges that cover `sample_rate`
#[cfg(feature = "audio")]
fn pick_config(
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Option<SupportedStreamConfig> {
    let rate = cpal::SampleRate(sample_rate);
    ranges
        .into_iter()
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter_map(|r| format_rank(r.sample_format()).map(|rank| (r.channels(), rank, r)))
        .min_by_key(|(channels, rank, _)| (*channels, *rank))
        .map(|(_, _, range)| range.with_sample_rate(rate))
}
