//! A software output device.
//!
//! [`VirtualOutput`] records every scheduled buffer instead of playing it.
//! Its clock is either advanced by hand, which gives deterministic timing in
//! tests, or follows the wall clock for dry runs without audio hardware.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::{Result, bail};

use crate::audio::frame::PlaybackBuffer;
use crate::io::output::OutputDevice;

/// A buffer handed to the device together with its start time.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledPlayback {
    pub start_time: f64,
    pub buffer: PlaybackBuffer,
}

impl ScheduledPlayback {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.buffer.duration_secs()
    }
}

#[derive(Debug, Clone, Copy)]
enum VirtualClock {
    Manual(f64),
    Realtime(Instant),
}

#[derive(Debug)]
struct VirtualState {
    clock: VirtualClock,
    scheduled: Vec<ScheduledPlayback>,
    failure: Option<String>,
}

/// Cloneable handle to a shared virtual device.
///
/// All clones see the same clock and schedule, so a test can keep one handle
/// while the streamer owns another.
#[derive(Debug, Clone)]
pub struct VirtualOutput {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualOutput {
    /// Device whose clock only moves through [`set_time`](Self::set_time) and
    /// [`advance`](Self::advance). Starts at `0.0`.
    pub fn manual() -> Self {
        Self::with_clock(VirtualClock::Manual(0.0))
    }

    /// Device whose clock is the wall time elapsed since creation.
    pub fn realtime() -> Self {
        Self::with_clock(VirtualClock::Realtime(Instant::now()))
    }

    fn with_clock(clock: VirtualClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(VirtualState {
                clock,
                scheduled: Vec::new(),
                failure: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move a manual clock to `time`. Ignored for a realtime clock.
    pub fn set_time(&self, time: f64) {
        if let VirtualClock::Manual(now) = &mut self.lock().clock {
            *now = time;
        }
    }

    /// Move a manual clock forward by `secs`. Ignored for a realtime clock.
    pub fn advance(&self, secs: f64) {
        if let VirtualClock::Manual(now) = &mut self.lock().clock {
            *now += secs;
        }
    }

    /// Make every following `schedule_buffer` call fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        self.lock().failure = Some(reason.into());
    }

    pub fn recover(&self) {
        self.lock().failure = None;
    }

    pub fn scheduled(&self) -> Vec<ScheduledPlayback> {
        self.lock().scheduled.clone()
    }

    pub fn scheduled_count(&self) -> usize {
        self.lock().scheduled.len()
    }

    /// Concatenation of every scheduled buffer, in schedule order.
    pub fn played_samples(&self) -> Vec<f32> {
        self.lock()
            .scheduled
            .iter()
            .flat_map(|s| s.buffer.data().iter().copied())
            .collect()
    }

    /// End time of the last scheduled buffer.
    pub fn last_end_time(&self) -> Option<f64> {
        self.lock().scheduled.last().map(ScheduledPlayback::end_time)
    }
}

impl OutputDevice for VirtualOutput {
    fn current_time(&self) -> f64 {
        match self.lock().clock {
            VirtualClock::Manual(now) => now,
            VirtualClock::Realtime(origin) => origin.elapsed().as_secs_f64(),
        }
    }

    fn schedule_buffer(&mut self, buffer: PlaybackBuffer, start_time: f64) -> Result<()> {
        let mut state = self.lock();
        if let Some(reason) = &state.failure {
            bail!("virtual device rejected buffer: {reason}");
        }
        state.scheduled.push(ScheduledPlayback { start_time, buffer });
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.lock().failure.is_none()
    }
}
