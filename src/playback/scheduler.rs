//! Back-to-back scheduling of playback buffers against the device clock.
//!
//! Start times come from an accumulating cursor, never from "now". Buffers
//! produced in irregular bursts therefore still play with zero gap and zero
//! overlap. The cursor is computed from the session origin plus the number
//! of frames scheduled so far, so it carries no accumulated rounding error.

use std::collections::VecDeque;

use tracing::{debug, error, warn};

use crate::audio::frame::PlaybackBuffer;
use crate::error::{Result, StreamError};
use crate::io::OutputDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No session origin yet and nothing queued.
    Idle,
    /// Handing queued buffers to the device.
    Scheduling,
    /// Queue ran dry. The cursor holds its value until more buffers arrive.
    Starved,
}

pub struct PlaybackScheduler {
    queue: VecDeque<PlaybackBuffer>,
    sample_rate: u32,
    initial_delay: f64,
    origin: Option<f64>,
    scheduled_frames: u64,
    stream_end_time: Option<f64>,
    state: SchedulerState,
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32, initial_delay: f64) -> Self {
        Self {
            queue: VecDeque::new(),
            sample_rate,
            initial_delay,
            origin: None,
            scheduled_frames: 0,
            stream_end_time: None,
            state: SchedulerState::Idle,
        }
    }

    /// Queue a buffer. The first buffer of a session anchors the cursor at
    /// `now + initial_delay`; later buffers keep the existing cursor.
    pub fn enqueue(&mut self, buffer: PlaybackBuffer, now: f64) {
        if self.origin.is_none() {
            let origin = now + self.initial_delay;
            debug!(
                "Schedule origin set to {:.4}s (device time {:.4}s + {:.3}s cushion)",
                origin, now, self.initial_delay
            );
            self.origin = Some(origin);
        }
        self.queue.push_back(buffer);
    }

    /// Hand every queued buffer to `device`, in FIFO order.
    ///
    /// Returns the number of buffers scheduled. On a device error the rest
    /// of the queue is discarded and the error is returned; the cursor stays
    /// at the buffer that failed.
    pub fn pump<D: OutputDevice + ?Sized>(&mut self, device: &mut D) -> Result<usize> {
        let Some(origin) = self.origin else {
            return Ok(0);
        };

        self.state = SchedulerState::Scheduling;
        let mut scheduled = 0;
        let now = device.current_time();

        while let Some(buffer) = self.queue.pop_front() {
            let start = origin + self.scheduled_frames as f64 / self.sample_rate as f64;
            let frames = buffer.len() as u64;

            if start < now {
                warn!(
                    "Buffer scheduled {:.1}ms behind the device clock",
                    (now - start) * 1000.0
                );
            }

            if let Err(e) = device.schedule_buffer(buffer, start) {
                error!("Output device rejected buffer at {:.4}s: {:#}", start, e);
                self.queue.clear();
                self.state = SchedulerState::Starved;
                return Err(StreamError::Scheduling(format!("{e:#}")));
            }

            self.scheduled_frames += frames;
            let end = origin + self.scheduled_frames as f64 / self.sample_rate as f64;
            self.stream_end_time = Some(end);
            scheduled += 1;
            debug!(
                "Scheduled {} samples at {:.4}s, next start {:.4}s",
                frames, start, end
            );
        }

        self.state = SchedulerState::Starved;
        Ok(scheduled)
    }

    /// Drop queued buffers and the cursor. The next session re-anchors on
    /// the device clock. Buffers already committed to the device still play.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.origin = None;
        self.scheduled_frames = 0;
        self.stream_end_time = None;
        self.state = SchedulerState::Idle;
    }

    pub(crate) fn reconfigure(&mut self, sample_rate: u32, initial_delay: f64) {
        debug_assert!(self.origin.is_none() && self.queue.is_empty());
        self.sample_rate = sample_rate;
        self.initial_delay = initial_delay;
    }

    /// Device time at which the next buffer will start, once anchored.
    pub fn next_start_time(&self) -> Option<f64> {
        self.origin
            .map(|origin| origin + self.scheduled_frames as f64 / self.sample_rate as f64)
    }

    /// End time of the last buffer handed to the device.
    pub fn stream_end_time(&self) -> Option<f64> {
        self.stream_end_time
    }

    pub fn queued_buffers(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queue_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }
}
