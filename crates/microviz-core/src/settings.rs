//! Runtime-tunable pipeline parameters
//!
//! [`Settings`] is the typed schema of everything the control interface may
//! change while capture is running. [`SettingsStore`] holds the live record
//! behind a lock so that the capture callback, every broadcast loop and the
//! HTTP handlers each work from one consistent snapshot per cycle.
//!
//! Updates arrive as loosely typed JSON. Each recognized key is coerced to
//! its field's type, the candidate record is range-checked, and only then is
//! it swapped in. A single bad value rejects the whole update.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, trace};

use crate::error::{Result, SettingsError};

/// Wire names of the settings fields
pub mod keys {
    /// [`Settings::sample_rate`](super::Settings::sample_rate)
    pub const SAMPLE_RATE: &str = "SAMPLE_RATE";
    /// [`Settings::block_size`](super::Settings::block_size)
    pub const CHUNK_SIZE: &str = "CHUNK_SIZE";
    /// [`Settings::fft_size`](super::Settings::fft_size)
    pub const FFT_SIZE: &str = "FFT_SIZE";
    /// [`Settings::num_bars`](super::Settings::num_bars)
    pub const NUM_BARS: &str = "NUM_BARS";
    /// [`Settings::smoothing`](super::Settings::smoothing)
    pub const SMOOTHING: &str = "SMOOTHING";
    /// [`Settings::send_interval`](super::Settings::send_interval)
    pub const SEND_INTERVAL: &str = "SEND_INTERVAL";
}

/// Largest accepted transform size
pub const MAX_FFT_SIZE: usize = 1 << 20;
/// Largest accepted capture block
pub const MAX_BLOCK_SIZE: usize = 1 << 20;
/// Largest accepted bar count
pub const MAX_BARS: usize = 1 << 16;

/// Pipeline parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Device sample rate in Hz
    #[serde(rename = "SAMPLE_RATE")]
    pub sample_rate: u32,
    /// Samples per capture callback
    #[serde(rename = "CHUNK_SIZE")]
    pub block_size: usize,
    /// Transform length; the block is zero-padded or truncated to it
    #[serde(rename = "FFT_SIZE")]
    pub fft_size: usize,
    /// Length of the published bar vector
    #[serde(rename = "NUM_BARS")]
    pub num_bars: usize,
    /// Weight of the previous bar vector, 0 = no smoothing, 1 = frozen
    #[serde(rename = "SMOOTHING")]
    pub smoothing: f64,
    /// Seconds between frames sent to each viewer
    #[serde(rename = "SEND_INTERVAL")]
    pub send_interval: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 1024,
            fft_size: 1024,
            num_bars: 300,
            smoothing: 0.8,
            send_interval: 0.015,
        }
    }
}

/// The subset of [`Settings`] that requires reopening the input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceParams {
    /// Device sample rate in Hz
    pub sample_rate: u32,
    /// Samples per processed block
    pub block_size: usize,
}

impl Settings {
    /// Number of bins in the magnitude spectrum
    pub fn spectrum_len(&self) -> usize {
        self.fft_size / 2
    }

    /// Parameters the capture device is opened with
    pub fn device_params(&self) -> DeviceParams {
        DeviceParams {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
        }
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(out_of_range(keys::SAMPLE_RATE, "must be greater than zero"));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(out_of_range(
                keys::CHUNK_SIZE,
                "must be between 1 and 1048576",
            ));
        }
        if self.fft_size < 2 || self.fft_size > MAX_FFT_SIZE {
            return Err(out_of_range(keys::FFT_SIZE, "must be between 2 and 1048576"));
        }
        if self.num_bars == 0 || self.num_bars > MAX_BARS {
            return Err(out_of_range(keys::NUM_BARS, "must be between 1 and 65536"));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(out_of_range(keys::SMOOTHING, "must be between 0.0 and 1.0"));
        }
        if !self.send_interval.is_finite() || self.send_interval <= 0.0 {
            return Err(out_of_range(
                keys::SEND_INTERVAL,
                "must be a positive number of seconds",
            ));
        }
        Ok(())
    }

    /// Return a copy with the recognized keys of `patch` applied.
    ///
    /// Unknown keys are ignored. Fails without side effects if any value
    /// cannot be coerced or the result does not validate.
    pub fn patched(&self, patch: &Value) -> Result<Settings> {
        let entries = patch.as_object().ok_or(SettingsError::NotAnObject)?;
        let mut next = *self;

        for (key, value) in entries {
            match key.as_str() {
                keys::SAMPLE_RATE => next.sample_rate = integer_field(keys::SAMPLE_RATE, value)?,
                keys::CHUNK_SIZE => next.block_size = integer_field(keys::CHUNK_SIZE, value)?,
                keys::FFT_SIZE => next.fft_size = integer_field(keys::FFT_SIZE, value)?,
                keys::NUM_BARS => next.num_bars = integer_field(keys::NUM_BARS, value)?,
                keys::SMOOTHING => next.smoothing = coerce_real(keys::SMOOTHING, value)?,
                keys::SEND_INTERVAL => next.send_interval = coerce_real(keys::SEND_INTERVAL, value)?,
                other => trace!("Ignoring unknown settings key '{}'", other),
            }
        }

        next.validate()?;
        Ok(next)
    }
}

fn out_of_range(field: &'static str, reason: &'static str) -> SettingsError {
    SettingsError::OutOfRange { field, reason }
}

fn coercion_error(field: &'static str, expected: &'static str, value: &Value) -> SettingsError {
    SettingsError::Coercion {
        field,
        expected,
        found: value.to_string(),
    }
}

/// Integers, reals (truncated toward zero) and integer strings
fn coerce_integer(field: &'static str, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.is_u64() {
                Err(out_of_range(field, "value too large"))
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() => Ok(f.trunc() as i64),
                    _ => Err(coercion_error(field, "an integer", value)),
                }
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| coercion_error(field, "an integer", value)),
        _ => Err(coercion_error(field, "an integer", value)),
    }
}

/// Numbers and numeric strings
fn coerce_real(field: &'static str, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| coercion_error(field, "a number", value)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| coercion_error(field, "a number", value)),
        _ => Err(coercion_error(field, "a number", value)),
    }
}

/// Coerce, then narrow to a strictly positive integer type
fn integer_field<T: TryFrom<i64>>(field: &'static str, value: &Value) -> Result<T> {
    let value = coerce_integer(field, value)?;
    if value <= 0 {
        return Err(out_of_range(field, "must be greater than zero"));
    }
    T::try_from(value).map_err(|_| out_of_range(field, "value too large"))
}

/// Shared, lock-guarded [`Settings`]
pub struct SettingsStore {
    current: RwLock<Settings>,
    device_subscribers: Mutex<Vec<Sender<DeviceParams>>>,
}

impl SettingsStore {
    /// Create a store from a validated initial record
    pub fn new(initial: Settings) -> Result<Self> {
        initial.validate()?;
        Ok(Self {
            current: RwLock::new(initial),
            device_subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Consistent copy of all fields
    pub fn snapshot(&self) -> Settings {
        *self.current.read()
    }

    /// Apply a partial update, all or nothing.
    ///
    /// Returns the full record after the update.
    pub fn update(&self, patch: &Value) -> Result<Settings> {
        let mut current = self.current.write();
        let next = current.patched(patch)?;
        let device_changed = next.device_params() != current.device_params();
        *current = next;
        drop(current);

        info!("Settings updated: {:?}", next);

        if device_changed {
            self.notify_device_change(next.device_params());
        }

        Ok(next)
    }

    /// Receive the new device parameters whenever sample rate or block size change
    pub fn subscribe_device_changes(&self) -> Receiver<DeviceParams> {
        let (tx, rx) = unbounded();
        self.device_subscribers.lock().push(tx);
        rx
    }

    fn notify_device_change(&self, params: DeviceParams) {
        let mut subscribers = self.device_subscribers.lock();
        subscribers.retain(|tx| tx.send(params).is_ok());
        debug!(
            "Device parameters changed to {:?}, notified {} subscriber(s)",
            params,
            subscribers.len()
        );
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self {
            current: RwLock::new(Settings::default()),
            device_subscribers: Mutex::new(Vec::new()),
        }
    }
}
