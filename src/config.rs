//! Configuration for the PCM streamer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 24_000;
pub const DEFAULT_BUFFER_MILLIS: u32 = 320;
pub const DEFAULT_INITIAL_BUFFER_DELAY_SECS: f64 = 0.05;
pub const DEFAULT_COMPLETION_CHECK_INTERVAL_MS: u64 = 100;

/// Streamer settings.
///
/// Every field has a default, so a partial JSON document such as
/// `{"sample_rate_hz": 16000}` is a valid configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    pub sample_rate_hz: u32,
    /// Length of one playback buffer in milliseconds.
    pub buffer_millis: u32,
    /// Cushion added to the device clock before the first buffer of a session.
    pub initial_buffer_delay_secs: f64,
    /// Cadence of the drain check once end-of-stream has been signalled.
    pub completion_check_interval_ms: u64,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            buffer_millis: DEFAULT_BUFFER_MILLIS,
            initial_buffer_delay_secs: DEFAULT_INITIAL_BUFFER_DELAY_SECS,
            completion_check_interval_ms: DEFAULT_COMPLETION_CHECK_INTERVAL_MS,
        }
    }
}

impl StreamerConfig {
    pub fn with_sample_rate(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            ..Self::default()
        }
    }

    /// Samples per playback buffer, `floor(sample_rate * buffer_millis / 1000)`.
    pub fn buffer_size(&self) -> usize {
        (self.sample_rate_hz as u64 * self.buffer_millis as u64 / 1000) as usize
    }

    /// Duration of one full playback buffer in seconds.
    pub fn buffer_duration_secs(&self) -> f64 {
        self.buffer_size() as f64 / self.sample_rate_hz as f64
    }

    pub fn completion_check_interval(&self) -> Duration {
        Duration::from_millis(self.completion_check_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate_hz == 0 {
            return Err(StreamError::InvalidConfig(
                "sample_rate_hz must be greater than zero".to_string(),
            ));
        }
        if self.buffer_size() == 0 {
            return Err(StreamError::InvalidConfig(format!(
                "buffer of {} ms at {} Hz holds no samples",
                self.buffer_millis, self.sample_rate_hz
            )));
        }
        if !self.initial_buffer_delay_secs.is_finite() || self.initial_buffer_delay_secs < 0.0 {
            return Err(StreamError::InvalidConfig(format!(
                "initial_buffer_delay_secs must be a non-negative number, got {}",
                self.initial_buffer_delay_secs
            )));
        }
        if self.completion_check_interval_ms == 0 {
            return Err(StreamError::InvalidConfig(
                "completion_check_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
