//! The output capability consumed by the playback scheduler.

use anyhow::Result;

use crate::audio::frame::PlaybackBuffer;

/// An audio output with its own monotonic clock.
///
/// The scheduler never plays audio itself. It reads the device clock and
/// commits buffers to start at exact device times. Once committed a buffer
/// cannot be retracted.
pub trait OutputDevice: Send {
    /// Current device time in seconds.
    fn current_time(&self) -> f64;

    /// Commit `buffer` to start playing at device time `start_time`.
    fn schedule_buffer(&mut self, buffer: PlaybackBuffer, start_time: f64) -> Result<()>;

    /// Sample rate the device was opened at, `None` if it accepts any rate.
    fn sample_rate(&self) -> Option<u32> {
        None
    }

    /// `false` once the device can no longer play anything, e.g. after the
    /// hardware stream reported an error.
    fn is_available(&self) -> bool {
        true
    }
}

impl<D: OutputDevice + ?Sized> OutputDevice for Box<D> {
    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn schedule_buffer(&mut self, buffer: PlaybackBuffer, start_time: f64) -> Result<()> {
        (**self).schedule_buffer(buffer, start_time)
    }

    fn sample_rate(&self) -> Option<u32> {
        (**self).sample_rate()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}
